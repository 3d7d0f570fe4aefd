//! Process-wide cancellation token.
//!
//! One token is created at startup and cloned into whichever delivery strategy runs.
//! The pull server hands it to the HTTP layer's graceful shutdown, the push writer
//! polls it between cycles and races it against the interval timer.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Cloneable shutdown signal. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Requests shutdown. Safe to call from any thread, any number of times.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any token clone, so this only returns once set.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Triggers this token on Ctrl-C (SIGINT).
    ///
    /// Can be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            token.trigger();
        })
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}
