//! Two-channel outcome model for the transaction engine.
//!
//! Conflicts are expected and frequent, so they travel as a value
//! (`CommitResult::Conflict`), never as an error. `TxnError` is the fatal
//! channel: programming misuse (double commit, unknown transaction id,
//! mismatched queue consumer) or storage failure. Callers retry a fresh
//! transaction on a conflict; they never retry a fatal error.

use std::io;

use thiserror::Error;

// ============================================================================
// Commit Result (expected channel)
// ============================================================================

/// Outcome of committing a transaction.
///
/// `Conflict` means another transaction committed an overlapping row set
/// concurrently; the transaction has been invalidated and its effects rolled
/// back. Start a new transaction to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum CommitResult {
    /// The transaction's writes are now visible to later snapshots.
    Committed,
    /// A concurrent transaction won; all effects have been undone.
    Conflict,
}

impl CommitResult {
    /// Whether the commit succeeded.
    pub fn is_committed(&self) -> bool {
        matches!(self, CommitResult::Committed)
    }

    /// Whether the commit lost to a concurrent transaction.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CommitResult::Conflict)
    }
}

// ============================================================================
// Fatal Errors
// ============================================================================

/// Fatal errors from the transaction engine.
///
/// These are never produced by an ordinary commit race and are never retried
/// by the core.
#[derive(Debug, Error)]
pub enum TxnError {
    /// Commit or abort of a transaction that is already Committed or Invalid.
    #[error("transaction {0} is already finalized")]
    AlreadyFinalized(u64),

    /// The write version was never issued by this oracle.
    #[error("unknown transaction {0}")]
    UnknownTransaction(u64),

    /// Queue entry does not exist (never enqueued, or evicted).
    #[error("unknown entry {entry_id} in queue {queue:?}")]
    UnknownQueueEntry { queue: Vec<u8>, entry_id: u64 },

    /// Ack by a consumer that does not hold the entry's dequeue token.
    #[error("entry {entry_id} is not held by consumer {consumer}")]
    WrongConsumer { entry_id: u64, consumer: u64 },

    /// Ack of an entry that was never tentatively dequeued, or rollback of
    /// an ack that never happened.
    #[error("entry {entry_id} is not in the expected dequeue state")]
    NotDequeued { entry_id: u64 },

    /// A counter cell holds a value that is not an 8-byte big-endian integer.
    #[error("counter value has length {0}, expected 8 bytes")]
    BadCounterValue(usize),

    /// Underlying physical store failure.
    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),
}
