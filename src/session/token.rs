// SessionToken - cancellation flag shared by everything working for a session
//
// Backed by a tokio watch channel so async work (queue pumping, report
// persistence) can await cancellation inside tokio::select!, while synchronous
// code just checks the flag.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct SessionToken {
    tx: Arc<watch::Sender<bool>>,
}

impl SessionToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Cancel; idempotent and visible to every clone immediately
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so wait_for cannot fail here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}
