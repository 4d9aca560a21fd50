//! Read Pointer - immutable visibility snapshot.
//!
//! Captured once at transaction start and never mutated, which is what makes
//! long-running reads stable: later commits can never change what an
//! existing pointer observes.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Fixes which write versions a reader may observe.
///
/// A version is visible iff it is at most `max_visible` and not in the
/// exclusion set. The exclusion set holds the write versions of every
/// transaction that was in progress or invalidated when the snapshot was
/// taken, so their writes stay hidden even though their versions are below
/// `max_visible`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadPointer {
    max_visible: u64,
    excluded: AHashSet<u64>,
}

impl ReadPointer {
    /// Create a pointer with an explicit exclusion set.
    pub fn new(max_visible: u64, excluded: AHashSet<u64>) -> Self {
        Self {
            max_visible,
            excluded,
        }
    }

    /// A pointer that sees everything up to `max_visible`, excluding nothing.
    pub fn latest(max_visible: u64) -> Self {
        Self {
            max_visible,
            excluded: AHashSet::new(),
        }
    }

    /// Highest write version this pointer may observe.
    pub fn max_visible(&self) -> u64 {
        self.max_visible
    }

    /// Whether a cell version is visible under this pointer.
    pub fn is_visible(&self, version: u64) -> bool {
        version <= self.max_visible && !self.excluded.contains(&version)
    }

    /// Number of excluded write versions (for monitoring).
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
