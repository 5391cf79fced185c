//! Cooperative cancellation for import loops

use tokio::sync::watch;
use tracing::{info, warn};

/// Trips a [`CancelToken`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Checked by the import loop between tiles
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelToken { rx })
    }

    /// A token that is never cancelled
    pub fn never() -> CancelToken {
        Self::pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled
    pub async fn cancelled(&mut self) {
        // A dropped handle can no longer cancel, so just wait forever.
        if self.rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Token tripped by the first Ctrl-C delivered to the process
    pub fn on_ctrl_c() -> CancelToken {
        let (handle, token) = Self::pair();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current tile");
                    handle.cancel();
                }
                Err(e) => warn!(error = %e, "unable to listen for interrupt signal"),
            }
        });
        token
    }
}
