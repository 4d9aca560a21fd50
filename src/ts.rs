//! Timestamp Authority - strictly increasing timestamps.
//!
//! Timestamps double as transaction identifiers, write versions and commit
//! identifiers. The rest of the engine depends only on the monotonicity
//! contract, not on the mechanism; a distributed coordinator would plug in
//! behind the same trait.

use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Authority Contract
// ============================================================================

/// Source of globally unique, strictly increasing timestamps.
///
/// Contract: for any two `next()` calls where one completed before the other
/// started, the later call returns a strictly greater value, across any
/// number of threads.
pub trait TimestampAuthority: Send + Sync {
    /// Issue the next timestamp.
    fn next(&self) -> u64;

    /// The highest timestamp issued so far (0 if none).
    fn current(&self) -> u64;
}

// ============================================================================
// In-Memory Authority
// ============================================================================

/// Single-process timestamp authority over an atomic counter.
///
/// Explicitly owned and injected (`Arc<dyn TimestampAuthority>`); never a
/// process-wide static, so independent engines get independent clocks.
pub struct MonotonicAuthority {
    counter: AtomicU64,
}

impl MonotonicAuthority {
    /// Create an authority starting at timestamp 1.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for MonotonicAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampAuthority for MonotonicAuthority {
    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_strictly_increasing() {
        let authority = MonotonicAuthority::new();
        let a = authority.next();
        let b = authority.next();
        let c = authority.next();
        assert!(a < b && b < c);
        assert_eq!(authority.current(), c);
    }

    #[test]
    fn test_starts_at_one() {
        let authority = MonotonicAuthority::new();
        assert_eq!(authority.current(), 0);
        assert_eq!(authority.next(), 1);
    }

    #[test]
    fn test_concurrent_allocation_never_repeats() {
        let authority = Arc::new(MonotonicAuthority::new());
        let threads = 8;
        let per_thread = 1000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let authority = Arc::clone(&authority);
                thread::spawn(move || {
                    (0..per_thread).map(|_| authority.next()).collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all: Vec<u64> = Vec::new();
        for handle in handles {
            let values = handle.join().unwrap();
            // Within a thread, values strictly increase.
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            all.extend(values);
        }

        // Globally, no repeats.
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), threads * per_thread);
        assert_eq!(authority.current(), (threads * per_thread) as u64);
    }
}
