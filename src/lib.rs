//! FabricKV Transactional Core
//!
//! Optimistic-concurrency-control (OCC) transaction engine over a
//! multi-version columnar key-value store:
//!
//! - `ts`: timestamp authority issuing strictly increasing versions
//! - `txn`: transaction oracle with snapshots, conflict detection, lifecycle
//! - `store`: versioned columnar store with tombstone delete/undelete and
//!   per-cell atomic read-modify-write
//! - `executor`: all-or-nothing batches with exact-inverse rollback
//! - `queue`: transactional dequeue/ack on the same primitives
//! - `retry`: bounded conflict-only retry policy
//!
//! Isolation is snapshot-based and validated only at commit; reads and
//! writes never block on other transactions.

pub mod data;
pub mod error;
pub mod executor;
pub mod queue;
pub mod retry;
pub mod store;
pub mod ts;
pub mod txn;

// Re-export main types
pub use data::{decode_long, encode_long, Bytes};
pub use error::{CommitResult, TxnError};
pub use executor::{Transaction, TransactionalExecutor, WriteOperation};
pub use queue::{DequeueResult, EntryPointer, QueueTable};
pub use retry::RetryPolicy;
pub use store::{MemoryTable, VersionedColumnarTable};
pub use ts::{MonotonicAuthority, TimestampAuthority};
pub use txn::{MemoryOracle, ReadPointer, RowSet, TransactionOracle, TxnPointer, TxnStatus};
