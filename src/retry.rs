//! Conflict retry policy - the caller-facing collaborator around the engine.
//!
//! Retries only the conflict outcome, with a bounded attempt count and a
//! fixed backoff. Fatal errors propagate immediately and are never retried;
//! each retry runs a brand-new transaction, never the same transaction id.

use std::time::Duration;

use log::debug;

use crate::error::{CommitResult, TxnError};

/// Bounded, fixed-backoff retry on commit conflicts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 20,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// A policy with the given retry bound and per-attempt backoff.
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Run `op` until it commits, fails fatally, or exhausts the retry
    /// bound. On exhaustion the final `Conflict` is returned as-is so the
    /// caller still sees the expected-outcome channel.
    pub fn run<F>(&self, mut op: F) -> Result<CommitResult, TxnError>
    where
        F: FnMut() -> Result<CommitResult, TxnError>,
    {
        let mut retries = 0;
        loop {
            match op()? {
                CommitResult::Committed => return Ok(CommitResult::Committed),
                CommitResult::Conflict => {
                    retries += 1;
                    if retries > self.max_retries {
                        return Ok(CommitResult::Conflict);
                    }
                    debug!("commit conflict, retry {} of {}", retries, self.max_retries);
                    if !self.backoff.is_zero() {
                        std::thread::sleep(self.backoff);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
