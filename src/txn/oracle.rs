//! Transaction Oracle - start, commit, abort, and write-write conflict detection.
//!
//! Strategy: **First-Committer-Wins**. A transaction conflicts at commit if
//! some other transaction with an overlapping row set committed after it
//! started. Conflicts are an expected outcome and travel as a value; only
//! misuse (double commit, unknown id) raises the fatal channel.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use log::debug;
use parking_lot::RwLock;

use crate::error::{CommitResult, TxnError};
use crate::ts::TimestampAuthority;

use super::read_pointer::ReadPointer;
use super::rowset::RowSet;

// ============================================================================
// Transaction Status
// ============================================================================

/// Status of a transaction known to the oracle.
///
/// `InProgress` is the only non-terminal state; `Committed` and `Invalid`
/// are terminal and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    /// Started, neither committed nor aborted.
    InProgress,
    /// Commit validated; writes are visible to later snapshots.
    Committed,
    /// Aborted or lost a conflict; writes must never become visible.
    Invalid,
}

// ============================================================================
// Transaction Pointer
// ============================================================================

/// Handle returned by `start_transaction`: the snapshot to read under and
/// the version to tag writes with.
#[derive(Debug, Clone)]
pub struct TxnPointer {
    /// Immutable visibility snapshot for all reads in this transaction.
    pub read_pointer: ReadPointer,
    /// Version for all writes; doubles as the transaction identifier.
    pub write_version: u64,
}

// ============================================================================
// Oracle Contract
// ============================================================================

/// Authority answering "is this version visible" and "did this transaction
/// conflict".
///
/// Pluggable: the in-memory implementation below and a distributed
/// coordinator must satisfy the same contract identically.
pub trait TransactionOracle: Send + Sync {
    /// Allocate a write version and build the transaction's snapshot.
    fn start_transaction(&self) -> TxnPointer;

    /// A fresh snapshot of the currently committed state, for reads outside
    /// any transaction.
    fn read_pointer(&self) -> ReadPointer;

    /// Validate and record a commit.
    ///
    /// Returns `Ok(Conflict)` when a concurrently committed transaction
    /// wrote an overlapping row (the transaction is invalidated). Committing
    /// an already-finalized or unknown transaction is a fatal error.
    fn commit(&self, write_version: u64, rows: &RowSet) -> Result<CommitResult, TxnError>;

    /// Mark an in-progress transaction Invalid without conflict evaluation.
    ///
    /// Idempotent for already-Invalid transactions; aborting a Committed
    /// transaction is a fatal error.
    fn abort(&self, write_version: u64) -> Result<(), TxnError>;

    /// Status of a transaction, if this oracle knows it.
    fn status(&self, write_version: u64) -> Option<TxnStatus>;
}

// ============================================================================
// Committed Record
// ============================================================================

/// Row set of a committed transaction, kept until no in-progress transaction
/// could still conflict with it.
struct CommittedWrite {
    commit_ts: u64,
    rows: RowSet,
}

// ============================================================================
// In-Memory Oracle
// ============================================================================

struct OracleInner {
    /// write_version -> start snapshot (`max_visible` at start).
    in_progress: AHashMap<u64, u64>,
    /// Write versions of invalidated transactions. Retained for the life of
    /// the oracle so residual versions stay excluded from every snapshot.
    invalid: AHashSet<u64>,
    /// Write versions that committed (survives row-set eviction, so a double
    /// commit is still distinguishable from an unknown transaction).
    committed_ids: AHashSet<u64>,
    /// Recently committed row sets, newest last.
    committed: Vec<CommittedWrite>,
}

/// Single-process oracle.
///
/// One lock guards all oracle state: snapshot construction takes it shared,
/// and commit holds it exclusively across check-then-record so two
/// conflicting commits cannot interleave. Timestamp allocation for starts
/// and commits happens under the lock, so a snapshot's exclusion set can
/// never miss a concurrently started transaction.
pub struct MemoryOracle {
    authority: Arc<dyn TimestampAuthority>,
    inner: RwLock<OracleInner>,
}

impl MemoryOracle {
    /// Create an oracle over the given timestamp authority.
    pub fn new(authority: Arc<dyn TimestampAuthority>) -> Self {
        Self {
            authority,
            inner: RwLock::new(OracleInner {
                in_progress: AHashMap::new(),
                invalid: AHashSet::new(),
                committed_ids: AHashSet::new(),
                committed: Vec::new(),
            }),
        }
    }

    /// Number of in-progress transactions.
    pub fn in_progress_count(&self) -> usize {
        self.inner.read().in_progress.len()
    }

    /// Number of committed row sets still retained for conflict checking.
    pub fn retained_row_sets(&self) -> usize {
        self.inner.read().committed.len()
    }

    fn excluded_of(inner: &OracleInner) -> AHashSet<u64> {
        let mut excluded: AHashSet<u64> = inner.in_progress.keys().copied().collect();
        excluded.extend(inner.invalid.iter().copied());
        excluded
    }

    /// Drop committed row sets no in-progress transaction can still
    /// conflict with: only a transaction that started before a commit can
    /// conflict with it, so anything committed at or below the oldest
    /// in-progress snapshot is unreachable.
    fn collect_garbage(inner: &mut OracleInner) {
        match inner.in_progress.values().copied().min() {
            Some(oldest_snapshot) => {
                let before = inner.committed.len();
                inner.committed.retain(|cw| cw.commit_ts > oldest_snapshot);
                let evicted = before - inner.committed.len();
                if evicted > 0 {
                    debug!("evicted {} committed row sets below snapshot {}", evicted, oldest_snapshot);
                }
            }
            None => inner.committed.clear(),
        }
    }
}

impl TransactionOracle for MemoryOracle {
    fn start_transaction(&self) -> TxnPointer {
        let mut inner = self.inner.write();
        let write_version = self.authority.next();
        let excluded = Self::excluded_of(&inner);
        let max_visible = write_version - 1;
        inner.in_progress.insert(write_version, max_visible);
        debug!("started transaction {}", write_version);
        TxnPointer {
            read_pointer: ReadPointer::new(max_visible, excluded),
            write_version,
        }
    }

    fn read_pointer(&self) -> ReadPointer {
        let inner = self.inner.read();
        ReadPointer::new(self.authority.current(), Self::excluded_of(&inner))
    }

    fn commit(&self, write_version: u64, rows: &RowSet) -> Result<CommitResult, TxnError> {
        let mut inner = self.inner.write();
        let max_visible = match inner.in_progress.get(&write_version) {
            Some(&snapshot) => snapshot,
            None => {
                return Err(
                    if inner.committed_ids.contains(&write_version)
                        || inner.invalid.contains(&write_version)
                    {
                        TxnError::AlreadyFinalized(write_version)
                    } else {
                        TxnError::UnknownTransaction(write_version)
                    },
                );
            }
        };

        // First-committer-wins: anything committed after our start snapshot
        // with an overlapping row set invalidates us.
        let conflict = inner
            .committed
            .iter()
            .any(|cw| cw.commit_ts > max_visible && cw.rows.overlaps(rows));
        if conflict {
            inner.in_progress.remove(&write_version);
            inner.invalid.insert(write_version);
            debug!("transaction {} conflicted", write_version);
            return Ok(CommitResult::Conflict);
        }

        // Commit identifiers come from the same authority as write versions.
        let commit_ts = self.authority.next();
        inner.in_progress.remove(&write_version);
        inner.committed_ids.insert(write_version);
        if !rows.is_empty() {
            inner.committed.push(CommittedWrite {
                commit_ts,
                rows: rows.clone(),
            });
        }
        Self::collect_garbage(&mut inner);
        debug!("transaction {} committed at {}", write_version, commit_ts);
        Ok(CommitResult::Committed)
    }

    fn abort(&self, write_version: u64) -> Result<(), TxnError> {
        let mut inner = self.inner.write();
        if inner.in_progress.remove(&write_version).is_some()
            || inner.invalid.contains(&write_version)
        {
            inner.invalid.insert(write_version);
            debug!("transaction {} aborted", write_version);
            return Ok(());
        }
        if inner.committed_ids.contains(&write_version) {
            return Err(TxnError::AlreadyFinalized(write_version));
        }
        Err(TxnError::UnknownTransaction(write_version))
    }

    fn status(&self, write_version: u64) -> Option<TxnStatus> {
        let inner = self.inner.read();
        if inner.in_progress.contains_key(&write_version) {
            Some(TxnStatus::InProgress)
        } else if inner.committed_ids.contains(&write_version) {
            Some(TxnStatus::Committed)
        } else if inner.invalid.contains(&write_version) {
            Some(TxnStatus::Invalid)
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::MonotonicAuthority;

    fn oracle() -> MemoryOracle {
        MemoryOracle::new(Arc::new(MonotonicAuthority::new()))
    }

    fn rows(keys: &[&[u8]]) -> RowSet {
        let mut set = RowSet::new();
        for key in keys {
            set.add_row(key);
        }
        set
    }

    #[test]
    fn test_start_excludes_in_progress() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        let t2 = oracle.start_transaction();
        assert!(t2.write_version > t1.write_version);
        // t1 was in progress when t2 started, so its version is hidden even
        // though it is below t2's bound.
        assert!(!t2.read_pointer.is_visible(t1.write_version));
    }

    #[test]
    fn test_write_write_conflict_first_committer_wins() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        let t2 = oracle.start_transaction();

        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());
        assert!(oracle.commit(t2.write_version, &rows(&[b"k"])).unwrap().is_conflict());
        assert_eq!(oracle.status(t2.write_version), Some(TxnStatus::Invalid));
    }

    #[test]
    fn test_conflict_when_older_commits_second() {
        // The younger transaction commits first; the older one must still
        // lose, which is why commit timestamps, not write versions, drive
        // the check.
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        let t2 = oracle.start_transaction();

        assert!(oracle.commit(t2.write_version, &rows(&[b"k"])).unwrap().is_committed());
        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_conflict());
    }

    #[test]
    fn test_independent_rows_never_conflict() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        let t2 = oracle.start_transaction();

        assert!(oracle.commit(t1.write_version, &rows(&[b"a"])).unwrap().is_committed());
        assert!(oracle.commit(t2.write_version, &rows(&[b"b"])).unwrap().is_committed());
    }

    #[test]
    fn test_no_conflict_when_first_commits_before_second_starts() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());

        let t2 = oracle.start_transaction();
        assert!(t2.read_pointer.is_visible(t1.write_version));
        assert!(oracle.commit(t2.write_version, &rows(&[b"k"])).unwrap().is_committed());
    }

    #[test]
    fn test_double_commit_is_fatal() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());

        let err = oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap_err();
        assert!(matches!(err, TxnError::AlreadyFinalized(_)));
    }

    #[test]
    fn test_commit_of_unknown_transaction_is_fatal() {
        let oracle = oracle();
        let err = oracle.commit(999, &RowSet::new()).unwrap_err();
        assert!(matches!(err, TxnError::UnknownTransaction(999)));
    }

    #[test]
    fn test_abort_marks_invalid_and_is_idempotent() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        oracle.abort(t1.write_version).unwrap();
        assert_eq!(oracle.status(t1.write_version), Some(TxnStatus::Invalid));
        oracle.abort(t1.write_version).unwrap();

        // Aborted versions are hidden from later snapshots.
        let rp = oracle.read_pointer();
        assert!(!rp.is_visible(t1.write_version));
    }

    #[test]
    fn test_abort_of_committed_transaction_is_fatal() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());
        assert!(matches!(
            oracle.abort(t1.write_version),
            Err(TxnError::AlreadyFinalized(_))
        ));
    }

    #[test]
    fn test_row_set_retention_bound() {
        let oracle = oracle();

        // An old reader pins the committed row set.
        let old = oracle.start_transaction();
        let t1 = oracle.start_transaction();
        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());
        assert_eq!(oracle.retained_row_sets(), 1);

        // Once nothing in progress predates the commit, it is evicted.
        assert!(oracle.commit(old.write_version, &rows(&[b"other"])).unwrap().is_committed());
        assert_eq!(oracle.retained_row_sets(), 0);
    }

    #[test]
    fn test_read_pointer_sees_committed_only() {
        let oracle = oracle();
        let t1 = oracle.start_transaction();
        let rp_before = oracle.read_pointer();
        assert!(!rp_before.is_visible(t1.write_version));

        assert!(oracle.commit(t1.write_version, &rows(&[b"k"])).unwrap().is_committed());
        let rp_after = oracle.read_pointer();
        assert!(rp_after.is_visible(t1.write_version));
    }
}
