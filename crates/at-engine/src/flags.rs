//! Bit-flag bus
//!
//! Shared bitmask of events that have happened and not yet been consumed.
//! The bridge loop raises bits as notifications and transaction results
//! arrive; callers block in [`FlagBus::wait`] until every bit they asked for
//! is raised, and the successful waiter clears exactly those bits.
//!
//! Bits stay raised until consumed, so a bit that was raised before the
//! waiter started still counts toward its conjunction.

use std::time::Duration;

use at_protocol::EventBits;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{EngineError, Result};

/// Shared event bitmask with conjunctive waits
#[derive(Debug)]
pub struct FlagBus {
    tx: watch::Sender<EventBits>,
}

impl FlagBus {
    /// Create a bus with no bits raised
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EventBits::NONE);
        Self { tx }
    }

    /// Raise bits and wake waiters
    pub fn set(&self, bits: EventBits) {
        if bits.is_empty() {
            return;
        }
        self.tx.send_modify(|current| *current |= bits);
        trace!("Raised bits {}", bits);
    }

    /// Clear bits without waking anyone
    pub fn clear(&self, bits: EventBits) {
        self.tx.send_if_modified(|current| {
            *current = current.difference(bits);
            false
        });
    }

    /// Currently raised bits
    pub fn snapshot(&self) -> EventBits {
        *self.tx.borrow()
    }

    /// Wait until every bit in `mask` is raised, then clear them
    ///
    /// Returns the bits that were raised at the moment the wait succeeded.
    /// Bits outside `mask` are left alone. On timeout nothing is cleared.
    pub async fn wait(&self, mask: EventBits, timeout: Duration) -> Result<EventBits> {
        let deadline = Instant::now() + timeout;
        // Subscribe before the first check so no raise can slip in between
        let mut rx = self.tx.subscribe();

        loop {
            if let Some(observed) = self.try_consume(mask) {
                return Ok(observed);
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(EngineError::Stopped),
                Err(_) => return Err(EngineError::timed_out(timeout)),
            }
        }
    }

    /// Clear `mask` if all of it is raised, atomically with the check
    pub fn try_consume(&self, mask: EventBits) -> Option<EventBits> {
        let mut observed = None;
        self.tx.send_if_modified(|current| {
            if current.contains(mask) {
                observed = Some(*current);
                *current = current.difference(mask);
            }
            // Clearing never satisfies anyone, so other waiters stay asleep
            false
        });
        observed
    }
}

impl Default for FlagBus {
    fn default() -> Self {
        Self::new()
    }
}
