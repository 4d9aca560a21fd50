//! Store SPI - the contract a physical store must implement.
//!
//! Rows, columns and values are opaque byte strings; versions are 64-bit
//! integers issued by the timestamp authority. The engine is
//! storage-agnostic: the in-memory table here and an HBase-like engine plug
//! in behind the same trait.

use std::collections::BTreeMap;

use crate::data::Bytes;
use crate::error::TxnError;
use crate::txn::ReadPointer;

/// A columnar table holding multiple timestamped versions per cell.
///
/// Visibility: a read returns, per column, the highest version `v` with
/// `rp.is_visible(v)` that is not hidden by a tombstone whose own marker
/// version is visible under `rp` and at least `v`. Absent cells are an
/// empty result, not an error.
///
/// `increment` and `compare_and_swap` are the store's only cell-level
/// atomic primitives; the rest of the engine relies on them being
/// linearizable per cell. Their internal read additionally sees versions at
/// exactly `write_version`, so a transaction's own prior write to the cell
/// (and the rollback's negative increment) observe each other.
pub trait VersionedColumnarTable: Send + Sync {
    /// Write a value at the given version. A version is written at most
    /// once per transaction; rollback's negative increment is the only path
    /// that rewrites an existing version.
    fn put(&self, row: &[u8], column: &[u8], version: u64, value: &[u8]) -> Result<(), TxnError>;

    /// Write several columns of one row at the same version.
    fn put_many(
        &self,
        row: &[u8],
        columns: &[Bytes],
        version: u64,
        values: &[Bytes],
    ) -> Result<(), TxnError>;

    /// Remove exactly one version of one cell (inverse of `put`).
    fn delete(&self, row: &[u8], column: &[u8], version: u64) -> Result<(), TxnError>;

    /// Remove exactly one version of several cells.
    fn delete_many(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError>;

    /// Tombstone all versions at or below `version` for the given columns.
    fn delete_all(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError>;

    /// Exactly cancel a prior `delete_all` at the same version, restoring
    /// prior visibility. Used exclusively for rollback.
    fn undelete_all(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError>;

    /// Latest visible value of every column in the row.
    fn get(&self, row: &[u8], rp: &ReadPointer) -> Result<BTreeMap<Bytes, Bytes>, TxnError>;

    /// Latest visible value of one cell.
    fn get_column(
        &self,
        row: &[u8],
        column: &[u8],
        rp: &ReadPointer,
    ) -> Result<Option<Bytes>, TxnError>;

    /// Latest visible value of one cell along with its version.
    fn get_with_version(
        &self,
        row: &[u8],
        column: &[u8],
        rp: &ReadPointer,
    ) -> Result<Option<(Bytes, u64)>, TxnError>;

    /// Latest visible values of the listed columns.
    fn get_columns(
        &self,
        row: &[u8],
        columns: &[Bytes],
        rp: &ReadPointer,
    ) -> Result<BTreeMap<Bytes, Bytes>, TxnError>;

    /// Latest visible values of all columns in `[start, stop)` binary order;
    /// `None` bounds are open.
    fn get_range(
        &self,
        row: &[u8],
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        rp: &ReadPointer,
    ) -> Result<BTreeMap<Bytes, Bytes>, TxnError>;

    /// Atomically read the visible counter value, add `amount`, and write
    /// the sum at `write_version`. Absent cells count as 0. Returns the
    /// post-increment value.
    fn increment(
        &self,
        row: &[u8],
        column: &[u8],
        amount: i64,
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<i64, TxnError>;

    /// Increment several columns of one row atomically.
    fn increment_many(
        &self,
        row: &[u8],
        columns: &[Bytes],
        amounts: &[i64],
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<BTreeMap<Bytes, i64>, TxnError>;

    /// Atomically write `value` at `write_version` if the visible value
    /// equals `expected` (`None` = absent). Returns whether the swap
    /// happened.
    fn compare_and_swap(
        &self,
        row: &[u8],
        column: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<bool, TxnError>;
}
