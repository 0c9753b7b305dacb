//! Server-wide stop signal.
//!
//! Long-running tasks hold a [`ShutdownSignal`] and check it at their
//! delay boundaries; the server owns the [`Shutdown`] trigger.

use tokio::sync::watch;

/// Owner side of the stop signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request every holder of a [`ShutdownSignal`] to stop.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Clear a previous trigger so the server can start again.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    /// Whether a stop has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// New observer of this signal.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of the stop signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether a stop has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop is requested (or the owner is gone).
    pub async fn triggered(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}
