//! Transaction Oracle - OCC lifecycle, visibility snapshots, conflict detection.
//!
//! The oracle tracks in-flight and committed transactions, computes each
//! transaction's immutable visibility snapshot at start, and validates
//! write-write conflicts at commit. Isolation is optimistic: no cross-row
//! locking, validation only at commit.

pub mod oracle;
pub mod read_pointer;
pub mod rowset;

pub use self::oracle::{MemoryOracle, TransactionOracle, TxnPointer, TxnStatus};
pub use self::read_pointer::ReadPointer;
pub use self::rowset::RowSet;
