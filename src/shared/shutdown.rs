//! Shutdown coordination
//!
//! One [`ShutdownSignal`] is created at startup and cloned into the HTTP
//! server and every background task (session sweeper, limiter eviction).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Fire the signal. Later calls are no-ops.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            info!("Shutdown signal triggered");
            let _ = self.sender.send(());
        }
    }

    /// Resolves once the signal has fired, including when it fired before
    /// this call.
    pub async fn wait(&self) {
        let mut rx = self.sender.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for SIGTERM/SIGINT (Ctrl+C elsewhere) and fire `shutdown`.
pub async fn listen_for_shutdown_signals(shutdown: ShutdownSignal) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = shutdown.wait() => return,
        }
        shutdown.trigger();
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
                info!("Received Ctrl+C");
            }
            _ = shutdown.wait() => return,
        }
        shutdown.trigger();
    }
}

/// Run `cleanup` bounded by `timeout`. Returns whether it finished in time.
pub async fn drain_with_timeout<Fut>(timeout: Duration, cleanup: Fut) -> bool
where
    Fut: Future<Output = ()>,
{
    info!("Draining (timeout: {}s)", timeout.as_secs());
    match tokio::time::timeout(timeout, cleanup).await {
        Ok(()) => {
            info!("Graceful shutdown completed");
            true
        }
        Err(_) => {
            warn!("Graceful shutdown timed out after {}s", timeout.as_secs());
            false
        }
    }
}
