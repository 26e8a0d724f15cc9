use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Graceful shutdown coordinator.
///
/// A single `CancellationToken` is broadcast to the HTTP server and every
/// background task. After the token fires the server stops accepting
/// connections and drains in-flight requests; `SHUTDOWN_TIMEOUT_SECS` bounds
/// the whole sequence.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a clone of the cancellation token for use by tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown for all tasks listening on this token.
    pub fn trigger_shutdown(&self) {
        info!("shutdown signal received, broadcasting to all tasks");
        self.token.cancel();
    }

    /// Wait for SIGINT or SIGTERM, then trigger coordinated shutdown.
    pub async fn wait_for_signal_and_shutdown(&self) {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop the server");
                    None
                }
            };

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C)");
            }
            _ = async {
                match sigterm.as_mut() {
                    Some(s) => { s.recv().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!("received SIGTERM");
            }
        }

        self.trigger_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Total shutdown timeout in seconds.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_all_tokens() {
        let coordinator = ShutdownCoordinator::new();
        let a = coordinator.token();
        let b = coordinator.token();
        assert!(!a.is_cancelled());
        coordinator.trigger_shutdown();
        a.cancelled().await;
        assert!(b.is_cancelled());
    }
}
