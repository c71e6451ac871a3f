// crates/mesh-rpc/src/shutdown.rs
//
// Level-triggered shutdown signalling between a worker's owner and its
// event loop.

use tokio::sync::watch;
use tracing::debug;

/// Owner side of the shutdown signal.
///
/// Once signalled it stays signalled. Dropping the channel counts as a
/// shutdown for every listener.
#[derive(Debug)]
pub struct ShutdownChannel {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownChannel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A new listener observing this channel.
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Ask listeners to shut down. Never blocks; repeated calls are no-ops.
    pub fn signal(&self) {
        if !self.tx.send_replace(true) {
            debug!("Shutdown signalled");
        }
    }

    pub fn is_signalled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Worker side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Whether shutdown has been requested (or the channel is gone).
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once shutdown is requested. Returns immediately if it
    /// already was.
    pub async fn wait(&mut self) {
        // An error means the channel was dropped, which is also a shutdown.
        let _ = self.rx.wait_for(|signalled| *signalled).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_is_level_triggered() {
        let channel = ShutdownChannel::new();
        let mut listener = channel.listener();
        assert!(!listener.is_shutdown());

        channel.signal();
        channel.signal();
        assert!(channel.is_signalled());

        // Observed by a listener created before and after the signal.
        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
        let mut late = channel.listener();
        tokio::time::timeout(Duration::from_secs(1), late.wait())
            .await
            .unwrap();
        assert!(late.is_shutdown());
    }

    #[tokio::test]
    async fn dropping_channel_counts_as_shutdown() {
        let channel = ShutdownChannel::new();
        let mut listener = channel.listener();
        drop(channel);
        assert!(listener.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
    }
}
