//! Cancellation signal for background tasks.

use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Fires the shutdown signal. Dropping the trigger fires it too.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signals every linked [`Shutdown`].
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns a new signal linked to this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns true once the trigger has fired or been dropped.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Completes once the trigger has fired or been dropped.
    pub async fn cancelled(&mut self) {
        // `wait_for` errors only when the sender is gone.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}
