//! Versioned Columnar Store - multi-version cells with tombstone delete/undelete.
//!
//! Columnar: a row holds any number of dynamically inserted columns, sorted
//! in ascending binary order. Versioned: every (row, column) holds multiple
//! timestamped values, read through a `ReadPointer` that enforces visibility.

pub mod memory;
pub mod table;

pub use self::memory::MemoryTable;
pub use self::table::VersionedColumnarTable;
