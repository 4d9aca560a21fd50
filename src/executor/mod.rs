//! Operation Executor - transactional batches over the store and queues.
//!
//! Orchestrates a transaction's lifecycle: start through the oracle, apply
//! a batch of heterogeneous operations at the transaction's write version,
//! commit through the oracle, or undo every applied effect in reverse order
//! on any failure. No partial batch is ever observable to another
//! transaction.

pub mod ops;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::data::Bytes;
use crate::error::{CommitResult, TxnError};
use crate::queue::{DequeueResult, QueueTable};
use crate::store::VersionedColumnarTable;
use crate::txn::{ReadPointer, RowSet, TransactionOracle, TxnPointer};

use self::ops::UndoOperation;
pub use self::ops::WriteOperation;

// ============================================================================
// Transaction Handle
// ============================================================================

/// Client-held state of one in-progress transaction.
///
/// The oracle owns the status (`InProgress -> Committed | Invalid`, both
/// terminal); this handle carries the snapshot, the accumulated row set and
/// the undo log.
pub struct Transaction {
    pointer: TxnPointer,
    row_set: RowSet,
    undo: Vec<UndoOperation>,
}

impl Transaction {
    /// The version this transaction's writes are tagged with; doubles as
    /// its identifier.
    pub fn write_version(&self) -> u64 {
        self.pointer.write_version
    }

    /// The immutable snapshot this transaction reads under.
    pub fn read_pointer(&self) -> &ReadPointer {
        &self.pointer.read_pointer
    }

    /// Rows written so far.
    pub fn row_set(&self) -> &RowSet {
        &self.row_set
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Applies batches of heterogeneous operations with all-or-nothing
/// visibility.
pub struct TransactionalExecutor {
    oracle: Arc<dyn TransactionOracle>,
    table: Arc<dyn VersionedColumnarTable>,
    queues: Arc<QueueTable>,
}

impl TransactionalExecutor {
    /// Create an executor over the given oracle, store and queues.
    pub fn new(
        oracle: Arc<dyn TransactionOracle>,
        table: Arc<dyn VersionedColumnarTable>,
        queues: Arc<QueueTable>,
    ) -> Self {
        Self {
            oracle,
            table,
            queues,
        }
    }

    // ========================================================================
    // Transaction Lifecycle
    // ========================================================================

    /// Start a transaction: snapshot plus write version from the oracle.
    pub fn start_transaction(&self) -> Transaction {
        Transaction {
            pointer: self.oracle.start_transaction(),
            row_set: RowSet::new(),
            undo: Vec::new(),
        }
    }

    /// Apply one operation at the transaction's write version.
    ///
    /// Returns `Ok(false)` when the operation refuses to apply (a
    /// compare-and-swap miss); the caller must then `abort` the transaction.
    /// `execute` does this automatically.
    pub fn apply(&self, txn: &mut Transaction, op: WriteOperation) -> Result<bool, TxnError> {
        let wv = txn.pointer.write_version;
        txn.row_set.add_row(op.row());
        match op {
            WriteOperation::Write { row, column, value } => {
                self.table.put(&row, &column, wv, &value)?;
                txn.undo.push(UndoOperation::DeleteVersion { row, column });
            }
            WriteOperation::Delete { row, columns } => {
                self.table.delete_all(&row, &columns, wv)?;
                txn.undo.push(UndoOperation::Undelete { row, columns });
            }
            WriteOperation::Increment { row, column, amount } => {
                self.table
                    .increment(&row, &column, amount, &txn.pointer.read_pointer, wv)?;
                txn.undo.push(UndoOperation::Increment {
                    row,
                    column,
                    amount: -amount,
                });
            }
            WriteOperation::CompareAndSwap {
                row,
                column,
                expected,
                value,
            } => {
                let swapped = self.table.compare_and_swap(
                    &row,
                    &column,
                    expected.as_deref(),
                    &value,
                    &txn.pointer.read_pointer,
                    wv,
                )?;
                if !swapped {
                    return Ok(false);
                }
                txn.undo.push(UndoOperation::DeleteVersion { row, column });
            }
            WriteOperation::Enqueue { queue, payload } => {
                let pointer = self.queues.enqueue(&queue, &payload);
                txn.undo.push(UndoOperation::EvictEntry { pointer });
            }
            WriteOperation::Ack { pointer, consumer } => {
                self.queues.ack(&pointer, consumer)?;
                txn.undo.push(UndoOperation::RestoreDequeue { pointer, consumer });
            }
        }
        Ok(true)
    }

    /// Commit through the oracle. On conflict, every applied operation is
    /// undone in reverse order before `Conflict` is returned.
    pub fn commit(&self, txn: Transaction) -> Result<CommitResult, TxnError> {
        match self.oracle.commit(txn.pointer.write_version, &txn.row_set)? {
            CommitResult::Committed => Ok(CommitResult::Committed),
            CommitResult::Conflict => {
                self.rollback(&txn)?;
                Ok(CommitResult::Conflict)
            }
        }
    }

    /// Undo every applied operation in reverse order, then invalidate the
    /// transaction.
    pub fn abort(&self, txn: Transaction) -> Result<(), TxnError> {
        self.rollback(&txn)?;
        self.oracle.abort(txn.pointer.write_version)
    }

    /// Start a transaction, apply the whole batch, and commit.
    ///
    /// An operation that refuses to apply, or a commit conflict, rolls
    /// everything back and yields `Conflict`. Fatal errors propagate, but
    /// the transaction is still rolled back and aborted first; leaving it
    /// InProgress would pin the oracle's committed row sets forever.
    pub fn execute(&self, batch: Vec<WriteOperation>) -> Result<CommitResult, TxnError> {
        let mut txn = self.start_transaction();
        for op in batch {
            match self.apply(&mut txn, op) {
                Ok(true) => {}
                Ok(false) => {
                    debug!("batch operation refused, rolling back transaction {}", txn.write_version());
                    self.abort(txn)?;
                    return Ok(CommitResult::Conflict);
                }
                Err(err) => {
                    debug!("batch operation failed, rolling back transaction {}", txn.write_version());
                    // Cleanup failure must not mask the original error.
                    let _ = self.abort(txn);
                    return Err(err);
                }
            }
        }
        self.commit(txn)
    }

    fn rollback(&self, txn: &Transaction) -> Result<(), TxnError> {
        let wv = txn.pointer.write_version;
        debug!("rolling back {} operations of transaction {}", txn.undo.len(), wv);
        for undo in txn.undo.iter().rev() {
            match undo {
                UndoOperation::DeleteVersion { row, column } => {
                    self.table.delete(row, column, wv)?;
                }
                UndoOperation::Undelete { row, columns } => {
                    self.table.undelete_all(row, columns, wv)?;
                }
                UndoOperation::Increment { row, column, amount } => {
                    self.table
                        .increment(row, column, *amount, &txn.pointer.read_pointer, wv)?;
                }
                UndoOperation::EvictEntry { pointer } => {
                    self.queues.evict(pointer)?;
                }
                UndoOperation::RestoreDequeue { pointer, consumer } => {
                    self.queues.unack(pointer, *consumer)?;
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read one cell against the current committed state.
    pub fn read_column(&self, row: &[u8], column: &[u8]) -> Result<Option<Bytes>, TxnError> {
        self.table.get_column(row, column, &self.oracle.read_pointer())
    }

    /// Read one cell under a caller-held snapshot.
    pub fn read_column_at(
        &self,
        row: &[u8],
        column: &[u8],
        rp: &ReadPointer,
    ) -> Result<Option<Bytes>, TxnError> {
        self.table.get_column(row, column, rp)
    }

    /// Read all columns of a row against the current committed state.
    pub fn read_row(&self, row: &[u8]) -> Result<BTreeMap<Bytes, Bytes>, TxnError> {
        self.table.get(row, &self.oracle.read_pointer())
    }

    /// Read all columns of a row under a caller-held snapshot.
    pub fn read_row_at(
        &self,
        row: &[u8],
        rp: &ReadPointer,
    ) -> Result<BTreeMap<Bytes, Bytes>, TxnError> {
        self.table.get(row, rp)
    }

    /// A fresh snapshot of the current committed state.
    pub fn read_pointer(&self) -> ReadPointer {
        self.oracle.read_pointer()
    }

    // ========================================================================
    // Queue Access
    // ========================================================================

    /// Tentatively dequeue an entry for a consumer (non-transactional).
    pub fn dequeue(&self, queue: &[u8], consumer: u64) -> DequeueResult {
        self.queues.dequeue(queue, consumer)
    }
}

// ============================================================================
// Tests
// ============================================================================
