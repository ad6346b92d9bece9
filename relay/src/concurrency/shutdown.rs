//! Broadcast shutdown signalling for worker tasks.
//!
//! A single shutdown signal terminates every worker listening on the channel.
//! Workers complete their current operation, then exit at the next loop head
//! without advancing their position.

use tokio::sync::watch;

/// Transmitter half of the shutdown channel.
pub type ShutdownTx = watch::Sender<bool>;

/// Receiver half of the shutdown channel.
pub type ShutdownRx = watch::Receiver<bool>;

/// Creates a new shutdown channel in the not-shut-down state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Waits until shutdown is signalled.
///
/// Resolves immediately when the signal was already sent. Also resolves when
/// the transmitter is dropped, which counts as an implicit shutdown.
pub async fn wait_for_shutdown(rx: &mut ShutdownRx) {
    let _ = rx.wait_for(|requested| *requested).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_reaches_all_receivers() {
        let (tx, mut rx_a) = create_shutdown_channel();
        let mut rx_b = tx.subscribe();

        tx.send(true).unwrap();

        wait_for_shutdown(&mut rx_a).await;
        wait_for_shutdown(&mut rx_b).await;
    }

    #[tokio::test]
    async fn dropped_transmitter_counts_as_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        wait_for_shutdown(&mut rx).await;
    }
}
