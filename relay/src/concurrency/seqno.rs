//! Monotonic sequence-number counter with a wait-for primitive.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{ErrorKind, RelayResult};
use crate::relay_error;

/// A single advancing watermark over transaction sequence numbers.
///
/// The counter never decreases. Partition readers use [`SeqnoCounter::wait_until`]
/// as their only ordering primitive to discover new work: the dispatch queue
/// advances the counter after routing each event, which wakes every reader
/// eligible to proceed.
#[derive(Debug, Clone)]
pub struct SeqnoCounter {
    head: Arc<watch::Sender<u64>>,
}

impl SeqnoCounter {
    /// Creates a counter starting at the given seqno.
    pub fn new(initial: u64) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { head: Arc::new(tx) }
    }

    /// Advances the counter to `max(head, seqno)` and wakes all waiters.
    pub fn set(&self, seqno: u64) {
        self.head.send_if_modified(|head| {
            if seqno > *head {
                *head = seqno;
                true
            } else {
                false
            }
        });
    }

    /// Returns a snapshot of the current head seqno.
    pub fn get(&self) -> u64 {
        *self.head.borrow()
    }

    /// Waits until the head seqno is at least `seqno`, returning the observed
    /// head value.
    ///
    /// Resolves immediately when the head is already past the target. The
    /// future is cancellation-safe; dropping it abandons the wait without
    /// affecting the counter.
    pub async fn wait_until(&self, seqno: u64) -> RelayResult<u64> {
        let mut rx = self.head.subscribe();
        let head = rx.wait_for(|head| *head >= seqno).await.map_err(|_| {
            relay_error!(
                ErrorKind::Cancelled,
                "Sequence counter dropped while waiting"
            )
        })?;

        Ok(*head)
    }
}

impl Default for SeqnoCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
