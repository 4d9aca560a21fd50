//! Queue Subsystem - enqueue/dequeue/ack on top of the transactional engine.
//!
//! Dequeue is non-transactional: it marks an entry tentatively consumed and
//! hands back a capability token. Ack is a transactional write that retires
//! the token; if the enclosing batch fails for any reason, rolling back the
//! ack restores the tentative marker so the same consumer can dequeue the
//! entry again. No two distinct consumers ever hold the same entry.

use std::collections::BTreeMap;

use ahash::AHashMap;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::data::Bytes;
use crate::error::TxnError;

// ============================================================================
// Entry Pointer
// ============================================================================

/// Capability token identifying one queue entry.
///
/// Returned by dequeue; only the matching ack (or its rollback) can retire
/// or restore the entry it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPointer {
    queue: Bytes,
    entry_id: u64,
}

impl EntryPointer {
    /// Queue the entry belongs to. The queue name is the row recorded in
    /// the transaction's row set for conflict checking.
    pub fn queue(&self) -> &[u8] {
        &self.queue
    }

    /// Position of the entry within its queue.
    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }
}

// ============================================================================
// Dequeue Result
// ============================================================================

/// Outcome of a dequeue. `Empty` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueResult {
    /// No entry available for this consumer.
    Empty,
    /// An entry tentatively held by this consumer.
    Entry {
        pointer: EntryPointer,
        payload: Bytes,
    },
}

impl DequeueResult {
    /// Whether no entry was available.
    pub fn is_empty(&self) -> bool {
        matches!(self, DequeueResult::Empty)
    }

    /// The entry's token, if one was dequeued.
    pub fn pointer(&self) -> Option<&EntryPointer> {
        match self {
            DequeueResult::Empty => None,
            DequeueResult::Entry { pointer, .. } => Some(pointer),
        }
    }

    /// The entry's payload, if one was dequeued.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            DequeueResult::Empty => None,
            DequeueResult::Entry { payload, .. } => Some(payload),
        }
    }
}

// ============================================================================
// Entry State
// ============================================================================

/// Per-entry state machine: `Available -> Tentative -> Retired`, with
/// `Retired -> Tentative` only via ack rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Available,
    Tentative { consumer: u64 },
    Retired,
}

#[derive(Debug, Clone)]
struct QueueEntry {
    payload: Bytes,
    state: EntryState,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    entries: BTreeMap<u64, QueueEntry>,
}

// ============================================================================
// Queue Table
// ============================================================================

/// All queues of one engine, keyed by queue name.
pub struct QueueTable {
    queues: RwLock<AHashMap<Bytes, QueueState>>,
}

impl QueueTable {
    /// Create an empty queue table.
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(AHashMap::new()),
        }
    }

    /// Append a payload to a queue, returning its token.
    pub fn enqueue(&self, queue: &[u8], payload: &[u8]) -> EntryPointer {
        let mut queues = self.queues.write();
        let state = queues.entry(queue.to_vec()).or_default();
        let entry_id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            entry_id,
            QueueEntry {
                payload: payload.to_vec(),
                state: EntryState::Available,
            },
        );
        EntryPointer {
            queue: queue.to_vec(),
            entry_id,
        }
    }

    /// Tentatively consume the oldest entry available to this consumer.
    ///
    /// An entry already held tentatively by the same consumer is returned
    /// again (redelivery after a rolled-back ack); entries held by other
    /// consumers are skipped.
    pub fn dequeue(&self, queue: &[u8], consumer: u64) -> DequeueResult {
        let mut queues = self.queues.write();
        let Some(state) = queues.get_mut(queue) else {
            return DequeueResult::Empty;
        };
        for (&entry_id, entry) in state.entries.iter_mut() {
            match entry.state {
                EntryState::Available => {}
                EntryState::Tentative { consumer: holder } if holder == consumer => {}
                _ => continue,
            }
            entry.state = EntryState::Tentative { consumer };
            return DequeueResult::Entry {
                pointer: EntryPointer {
                    queue: queue.to_vec(),
                    entry_id,
                },
                payload: entry.payload.clone(),
            };
        }
        DequeueResult::Empty
    }

    /// Permanently retire a tentatively held entry.
    ///
    /// Fatal if the entry is unknown, was never dequeued, or is held by a
    /// different consumer.
    pub fn ack(&self, pointer: &EntryPointer, consumer: u64) -> Result<(), TxnError> {
        let mut queues = self.queues.write();
        let entry = Self::entry_mut(&mut queues, pointer)?;
        match entry.state {
            EntryState::Tentative { consumer: holder } if holder == consumer => {
                entry.state = EntryState::Retired;
                Ok(())
            }
            EntryState::Tentative { consumer: holder } => Err(TxnError::WrongConsumer {
                entry_id: pointer.entry_id,
                consumer: holder,
            }),
            _ => Err(TxnError::NotDequeued {
                entry_id: pointer.entry_id,
            }),
        }
    }

    /// Reverse an ack: restore the tentative marker so the same consumer
    /// can dequeue the entry again. Used exclusively for rollback.
    pub fn unack(&self, pointer: &EntryPointer, consumer: u64) -> Result<(), TxnError> {
        let mut queues = self.queues.write();
        let entry = Self::entry_mut(&mut queues, pointer)?;
        if entry.state != EntryState::Retired {
            return Err(TxnError::NotDequeued {
                entry_id: pointer.entry_id,
            });
        }
        entry.state = EntryState::Tentative { consumer };
        debug!("restored dequeue marker for entry {}", pointer.entry_id);
        Ok(())
    }

    /// Physically remove an entry. Used exclusively to reverse an enqueue
    /// whose transaction failed; the entry's payload was never committed.
    pub fn evict(&self, pointer: &EntryPointer) -> Result<(), TxnError> {
        let mut queues = self.queues.write();
        let Some(state) = queues.get_mut(&pointer.queue) else {
            return Err(TxnError::UnknownQueueEntry {
                queue: pointer.queue.clone(),
                entry_id: pointer.entry_id,
            });
        };
        if state.entries.remove(&pointer.entry_id).is_none() {
            return Err(TxnError::UnknownQueueEntry {
                queue: pointer.queue.clone(),
                entry_id: pointer.entry_id,
            });
        }
        Ok(())
    }

    fn entry_mut<'a>(
        queues: &'a mut AHashMap<Bytes, QueueState>,
        pointer: &EntryPointer,
    ) -> Result<&'a mut QueueEntry, TxnError> {
        queues
            .get_mut(&pointer.queue)
            .and_then(|state| state.entries.get_mut(&pointer.entry_id))
            .ok_or_else(|| TxnError::UnknownQueueEntry {
                queue: pointer.queue.clone(),
                entry_id: pointer.entry_id,
            })
    }
}

impl Default for QueueTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue_ack() {
        let queues = QueueTable::new();
        queues.enqueue(b"q", b"payload");

        let result = queues.dequeue(b"q", 0);
        assert_eq!(result.payload(), Some(b"payload".as_slice()));

        queues.ack(result.pointer().unwrap(), 0).unwrap();
        assert!(queues.dequeue(b"q", 0).is_empty());
    }

    #[test]
    fn test_empty_dequeue_is_normal() {
        let queues = QueueTable::new();
        assert!(queues.dequeue(b"missing", 0).is_empty());
    }

    #[test]
    fn test_redelivery_to_same_consumer_only() {
        let queues = QueueTable::new();
        queues.enqueue(b"q", b"e");

        let held = queues.dequeue(b"q", 0);
        assert!(!held.is_empty());

        // Another consumer never observes the held token.
        assert!(queues.dequeue(b"q", 1).is_empty());
        // The holder dequeues the same entry again.
        assert_eq!(queues.dequeue(b"q", 0), held);
    }

    #[test]
    fn test_fifo_across_entries() {
        let queues = QueueTable::new();
        queues.enqueue(b"q", b"first");
        queues.enqueue(b"q", b"second");

        let a = queues.dequeue(b"q", 0);
        assert_eq!(a.payload(), Some(b"first".as_slice()));
        let b = queues.dequeue(b"q", 1);
        assert_eq!(b.payload(), Some(b"second".as_slice()));
    }

    #[test]
    fn test_ack_by_wrong_consumer_is_fatal() {
        let queues = QueueTable::new();
        queues.enqueue(b"q", b"e");
        let held = queues.dequeue(b"q", 0);

        let err = queues.ack(held.pointer().unwrap(), 1).unwrap_err();
        assert!(matches!(err, TxnError::WrongConsumer { .. }));
    }

    #[test]
    fn test_ack_without_dequeue_is_fatal() {
        let queues = QueueTable::new();
        let pointer = queues.enqueue(b"q", b"e");
        let err = queues.ack(&pointer, 0).unwrap_err();
        assert!(matches!(err, TxnError::NotDequeued { .. }));
    }

    #[test]
    fn test_unack_restores_dequeueability() {
        let queues = QueueTable::new();
        queues.enqueue(b"q", b"e");
        let held = queues.dequeue(b"q", 0);
        let pointer = held.pointer().unwrap().clone();

        queues.ack(&pointer, 0).unwrap();
        assert!(queues.dequeue(b"q", 0).is_empty());

        queues.unack(&pointer, 0).unwrap();
        let again = queues.dequeue(b"q", 0);
        assert_eq!(again.pointer(), Some(&pointer));
    }

    #[test]
    fn test_evict_removes_entry() {
        let queues = QueueTable::new();
        let pointer = queues.enqueue(b"q", b"e");
        queues.evict(&pointer).unwrap();
        assert!(queues.dequeue(b"q", 0).is_empty());
        assert!(matches!(
            queues.evict(&pointer),
            Err(TxnError::UnknownQueueEntry { .. })
        ));
    }
}
