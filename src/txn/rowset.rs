//! Row Set - the rows a transaction has written.
//!
//! Ephemeral: used only for conflict checking at commit, discarded once no
//! in-progress transaction could still reference it.

use ahash::AHashSet;

use crate::data::Bytes;

/// Set of rows written by one transaction.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    rows: AHashSet<Bytes>,
}

impl RowSet {
    /// Create an empty row set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a row was written.
    pub fn add_row(&mut self, row: &[u8]) {
        self.rows.insert(row.to_vec());
    }

    /// Whether the given row is in the set.
    pub fn contains(&self, row: &[u8]) -> bool {
        self.rows.contains(row)
    }

    /// Whether any row appears in both sets.
    pub fn overlaps(&self, other: &RowSet) -> bool {
        let (small, large) = if self.rows.len() <= other.rows.len() {
            (&self.rows, &other.rows)
        } else {
            (&other.rows, &self.rows)
        };
        small.iter().any(|row| large.contains(row))
    }

    /// Whether no rows were written.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows written.
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
