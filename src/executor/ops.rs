//! Batch operations and their inverses.
//!
//! Every operation variant has a statically known inverse; the executor
//! applies inverses in reverse application order on any failure instead of
//! relying on per-call-site undo logic.

use crate::data::Bytes;
use crate::queue::EntryPointer;

// ============================================================================
// Write Operations
// ============================================================================

/// One operation of a transactional batch, applied at the transaction's
/// write version.
#[derive(Debug, Clone)]
pub enum WriteOperation {
    /// Write a value to one cell.
    Write {
        row: Bytes,
        column: Bytes,
        value: Bytes,
    },
    /// Tombstone all versions of the given columns up to the write version.
    Delete { row: Bytes, columns: Vec<Bytes> },
    /// Atomically add to a counter cell.
    Increment {
        row: Bytes,
        column: Bytes,
        amount: i64,
    },
    /// Conditional write; a miss fails the whole batch (retryable outcome).
    CompareAndSwap {
        row: Bytes,
        column: Bytes,
        expected: Option<Bytes>,
        value: Bytes,
    },
    /// Append a payload to a queue.
    Enqueue { queue: Bytes, payload: Bytes },
    /// Retire a tentatively dequeued entry.
    Ack {
        pointer: EntryPointer,
        consumer: u64,
    },
}

impl WriteOperation {
    /// The row this operation touches, as recorded in the transaction's row
    /// set. Queue operations conflict at queue granularity, so the queue
    /// name is their row.
    pub fn row(&self) -> &[u8] {
        match self {
            WriteOperation::Write { row, .. }
            | WriteOperation::Delete { row, .. }
            | WriteOperation::Increment { row, .. }
            | WriteOperation::CompareAndSwap { row, .. } => row,
            WriteOperation::Enqueue { queue, .. } => queue,
            WriteOperation::Ack { pointer, .. } => pointer.queue(),
        }
    }
}

// ============================================================================
// Undo Operations
// ============================================================================

/// Exact inverse of one applied operation, executed at the same write
/// version during rollback.
#[derive(Debug, Clone)]
pub(crate) enum UndoOperation {
    /// Remove the version written by `Write` or `CompareAndSwap`.
    DeleteVersion { row: Bytes, column: Bytes },
    /// Cancel the tombstones written by `Delete`.
    Undelete { row: Bytes, columns: Vec<Bytes> },
    /// Increment by the negated amount, rewriting the same version.
    Increment {
        row: Bytes,
        column: Bytes,
        amount: i64,
    },
    /// Remove the entry appended by `Enqueue`.
    EvictEntry { pointer: EntryPointer },
    /// Restore the tentative-dequeue marker retired by `Ack`.
    RestoreDequeue {
        pointer: EntryPointer,
        consumer: u64,
    },
}
