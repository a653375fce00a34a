// Shutdown Token - cancellation threaded through every loop

use tokio::sync::watch;

/// Shutdown signal for graceful termination
///
/// A dropped sender counts as a shutdown request.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
#[derive(Debug)]
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every holder of a token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token bound to this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_wakes_on_shutdown() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let waiter = tokio::spawn(async move {
            token.wait().await;
            token.is_shutdown()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.shutdown();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_shutdown() {
        let (tx, _token) = shutdown_channel();
        tx.shutdown();

        let mut late = tx.token();
        assert!(late.is_shutdown());
        late.wait().await;
    }

    #[tokio::test]
    async fn test_dropped_sender_is_shutdown() {
        let (tx, mut token) = shutdown_channel();
        drop(tx);
        assert!(token.is_shutdown());
        token.wait().await;
    }
}
