//! Byte-string data model shared by the store, oracle and executor.
//!
//! Rows, columns, values and queue payloads are all opaque byte strings;
//! columns sort in ascending binary order. Counter cells hold 8-byte
//! big-endian signed integers.

use crate::error::TxnError;

/// Opaque byte string used for rows, columns, values and payloads.
pub type Bytes = Vec<u8>;

/// Encode a counter value as 8 big-endian bytes.
pub fn encode_long(value: i64) -> Bytes {
    value.to_be_bytes().to_vec()
}

/// Decode a counter value from 8 big-endian bytes.
///
/// A malformed counter cell is a fatal error, never a silent zero.
pub fn decode_long(bytes: &[u8]) -> Result<i64, TxnError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| TxnError::BadCounterValue(bytes.len()))?;
    Ok(i64::from_be_bytes(arr))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_codec() {
        assert_eq!(decode_long(&encode_long(0)).unwrap(), 0);
        assert_eq!(decode_long(&encode_long(42)).unwrap(), 42);
        assert_eq!(decode_long(&encode_long(-7)).unwrap(), -7);
        assert_eq!(decode_long(&encode_long(i64::MAX)).unwrap(), i64::MAX);
    }

    #[test]
    fn test_malformed_counter_is_fatal() {
        let err = decode_long(b"abc").unwrap_err();
        assert!(matches!(err, TxnError::BadCounterValue(3)));
    }

    #[test]
    fn test_binary_order_of_encoded_longs() {
        // Non-negative counters keep their numeric order under binary
        // comparison, which is what column sorting relies on.
        assert!(encode_long(1) < encode_long(2));
        assert!(encode_long(255) < encode_long(256));
    }
}
