//! In-memory versioned columnar table.
//!
//! Each cell keeps its versions in a BTree chain plus a set of tombstone
//! markers. A single table lock makes increment and compare-and-swap
//! linearizable per cell; plain reads take it shared.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Included, Unbounded};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::data::{decode_long, encode_long, Bytes};
use crate::error::TxnError;
use crate::txn::ReadPointer;

use super::table::VersionedColumnarTable;

// ============================================================================
// Cell History
// ============================================================================

/// All versions of a single (row, column) cell, plus tombstone markers.
///
/// A tombstone at marker version `m` hides every version `<= m`, but only
/// for readers whose pointer can see `m` itself; markers written by excluded
/// transactions are inactive.
#[derive(Debug, Clone, Default)]
struct CellHistory {
    versions: BTreeMap<u64, Bytes>,
    tombstones: BTreeSet<u64>,
}

impl CellHistory {
    /// Highest visible version under `rp`, optionally treating `own` (the
    /// caller's write version) as visible too.
    fn visible(&self, rp: &ReadPointer, own: Option<u64>) -> Option<(u64, &Bytes)> {
        let sees = |v: u64| rp.is_visible(v) || own == Some(v);
        let marker = self.tombstones.iter().rev().copied().find(|&m| sees(m));
        for (&v, value) in self.versions.iter().rev() {
            if !sees(v) {
                continue;
            }
            // Everything at or below an active marker is hidden, and all
            // remaining versions are older still.
            if marker.is_some_and(|m| m >= v) {
                return None;
            }
            return Some((v, value));
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.versions.is_empty() && self.tombstones.is_empty()
    }
}

// ============================================================================
// Memory Table
// ============================================================================

type ColumnMap = BTreeMap<Bytes, CellHistory>;

/// In-memory implementation of the store SPI.
pub struct MemoryTable {
    rows: RwLock<AHashMap<Bytes, ColumnMap>>,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(AHashMap::new()),
        }
    }

    /// Number of rows with any data (for monitoring).
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    fn with_cell<R>(&self, row: &[u8], column: &[u8], f: impl FnOnce(&mut CellHistory) -> R) -> R {
        let mut rows = self.rows.write();
        let columns = rows.entry(row.to_vec()).or_default();
        f(columns.entry(column.to_vec()).or_default())
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionedColumnarTable for MemoryTable {
    fn put(&self, row: &[u8], column: &[u8], version: u64, value: &[u8]) -> Result<(), TxnError> {
        self.with_cell(row, column, |cell| {
            cell.versions.insert(version, value.to_vec());
        });
        Ok(())
    }

    fn put_many(
        &self,
        row: &[u8],
        columns: &[Bytes],
        version: u64,
        values: &[Bytes],
    ) -> Result<(), TxnError> {
        let mut rows = self.rows.write();
        let column_map = rows.entry(row.to_vec()).or_default();
        for (column, value) in columns.iter().zip(values) {
            column_map
                .entry(column.clone())
                .or_default()
                .versions
                .insert(version, value.clone());
        }
        Ok(())
    }

    fn delete(&self, row: &[u8], column: &[u8], version: u64) -> Result<(), TxnError> {
        let mut rows = self.rows.write();
        if let Some(column_map) = rows.get_mut(row) {
            if let Some(cell) = column_map.get_mut(column) {
                cell.versions.remove(&version);
                if cell.is_empty() {
                    column_map.remove(column);
                }
            }
            if column_map.is_empty() {
                rows.remove(row);
            }
        }
        Ok(())
    }

    fn delete_many(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError> {
        for column in columns {
            self.delete(row, column, version)?;
        }
        Ok(())
    }

    fn delete_all(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError> {
        let mut rows = self.rows.write();
        let column_map = rows.entry(row.to_vec()).or_default();
        for column in columns {
            column_map
                .entry(column.clone())
                .or_default()
                .tombstones
                .insert(version);
        }
        Ok(())
    }

    fn undelete_all(&self, row: &[u8], columns: &[Bytes], version: u64) -> Result<(), TxnError> {
        let mut rows = self.rows.write();
        if let Some(column_map) = rows.get_mut(row) {
            for column in columns {
                if let Some(cell) = column_map.get_mut(column) {
                    cell.tombstones.remove(&version);
                }
            }
        }
        Ok(())
    }

    fn get(&self, row: &[u8], rp: &ReadPointer) -> Result<BTreeMap<Bytes, Bytes>, TxnError> {
        let rows = self.rows.read();
        let mut result = BTreeMap::new();
        if let Some(column_map) = rows.get(row) {
            for (column, cell) in column_map {
                if let Some((_, value)) = cell.visible(rp, None) {
                    result.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(result)
    }

    fn get_column(
        &self,
        row: &[u8],
        column: &[u8],
        rp: &ReadPointer,
    ) -> Result<Option<Bytes>, TxnError> {
        Ok(self.get_with_version(row, column, rp)?.map(|(value, _)| value))
    }

    fn get_with_version(
        &self,
        row: &[u8],
        column: &[u8],
        rp: &ReadPointer,
    ) -> Result<Option<(Bytes, u64)>, TxnError> {
        let rows = self.rows.read();
        Ok(rows
            .get(row)
            .and_then(|column_map| column_map.get(column))
            .and_then(|cell| cell.visible(rp, None))
            .map(|(version, value)| (value.clone(), version)))
    }

    fn get_columns(
        &self,
        row: &[u8],
        columns: &[Bytes],
        rp: &ReadPointer,
    ) -> Result<BTreeMap<Bytes, Bytes>, TxnError> {
        let rows = self.rows.read();
        let mut result = BTreeMap::new();
        if let Some(column_map) = rows.get(row) {
            for column in columns {
                if let Some((_, value)) = column_map.get(column).and_then(|c| c.visible(rp, None)) {
                    result.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(result)
    }

    fn get_range(
        &self,
        row: &[u8],
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
        rp: &ReadPointer,
    ) -> Result<BTreeMap<Bytes, Bytes>, TxnError> {
        let rows = self.rows.read();
        let mut result = BTreeMap::new();
        if let Some(column_map) = rows.get(row) {
            let lower = start.map_or(Unbounded, Included);
            let upper = stop.map_or(Unbounded, Excluded);
            for (column, cell) in column_map.range::<[u8], _>((lower, upper)) {
                if let Some((_, value)) = cell.visible(rp, None) {
                    result.insert(column.clone(), value.clone());
                }
            }
        }
        Ok(result)
    }

    fn increment(
        &self,
        row: &[u8],
        column: &[u8],
        amount: i64,
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<i64, TxnError> {
        self.with_cell(row, column, |cell| {
            let current = match cell.visible(rp, Some(write_version)) {
                Some((_, value)) => decode_long(value)?,
                None => 0,
            };
            let updated = current.wrapping_add(amount);
            cell.versions.insert(write_version, encode_long(updated));
            Ok(updated)
        })
    }

    fn increment_many(
        &self,
        row: &[u8],
        columns: &[Bytes],
        amounts: &[i64],
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<BTreeMap<Bytes, i64>, TxnError> {
        let mut rows = self.rows.write();
        let column_map = rows.entry(row.to_vec()).or_default();
        let mut result = BTreeMap::new();
        for (column, &amount) in columns.iter().zip(amounts) {
            let cell = column_map.entry(column.clone()).or_default();
            let current = match cell.visible(rp, Some(write_version)) {
                Some((_, value)) => decode_long(value)?,
                None => 0,
            };
            let updated = current.wrapping_add(amount);
            cell.versions.insert(write_version, encode_long(updated));
            result.insert(column.clone(), updated);
        }
        Ok(result)
    }

    fn compare_and_swap(
        &self,
        row: &[u8],
        column: &[u8],
        expected: Option<&[u8]>,
        value: &[u8],
        rp: &ReadPointer,
        write_version: u64,
    ) -> Result<bool, TxnError> {
        self.with_cell(row, column, |cell| {
            let current = cell
                .visible(rp, Some(write_version))
                .map(|(_, v)| v.as_slice());
            if current != expected {
                return Ok(false);
            }
            cell.versions.insert(write_version, value.to_vec());
            Ok(true)
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
