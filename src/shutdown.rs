//! Cooperative cancellation triggered by the process interrupt signal.

use crate::error::{Result, WatchError};
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

static INTERRUPT_HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Exit status used when a second interrupt cuts shutdown short.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Owns the process-wide cancellation token.
///
/// The token moves from active to cancelled at most once. Repeated triggers
/// are ignored and only logged at debug level.
///
/// # Examples
///
/// ```rust
/// use regwatch::shutdown::Shutdown;
///
/// let shutdown = Shutdown::new();
/// let token = shutdown.token();
///
/// assert!(shutdown.trigger("test"));
/// assert!(!shutdown.trigger("test again"));
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
    fired: AtomicBool,
}

impl Shutdown {
    /// Create a coordinator with an active token.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A clone of the token observed by long-running loops.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether cancellation has been requested.
    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Request cancellation. Returns `true` only for the first call.
    pub fn trigger(&self, reason: &str) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(reason, "shutdown already requested");
            return false;
        }
        info!(reason, "shutdown requested");
        self.token.cancel();
        true
    }

    /// Trigger on the first completion of `signal`, then stop listening.
    ///
    /// The task also exits if the token is cancelled some other way.
    pub fn listen<F>(self: &Arc<Self>, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                result = signal => match result {
                    Ok(()) => {
                        this.trigger("interrupt");
                    }
                    Err(err) => error!(error = %err, "failed to listen for interrupt signal"),
                },
                _ = this.token.cancelled() => {}
            }
        })
    }

    /// Trigger on the first signal produced by `signal`, then keep listening
    /// and call `force` on the next one.
    ///
    /// If the token is cancelled some other way first, the next signal goes
    /// straight to `force`. The task only ends after forcing or when a signal
    /// source fails.
    pub fn listen_with_escalation<S, Fut, F>(
        self: &Arc<Self>,
        mut signal: S,
        force: F,
    ) -> JoinHandle<()>
    where
        S: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                result = signal() => match result {
                    Ok(()) => {
                        this.trigger("interrupt");
                    }
                    Err(err) => {
                        error!(error = %err, "failed to listen for interrupt signal");
                        return;
                    }
                },
                _ = this.token.cancelled() => {}
            }

            match signal().await {
                Ok(()) => {
                    error!("interrupted again during shutdown, exiting immediately");
                    force();
                }
                Err(err) => error!(error = %err, "failed to listen for interrupt signal"),
            }
        })
    }

    /// Listen for Ctrl-C. May succeed once per process.
    ///
    /// The first Ctrl-C requests a cooperative shutdown. A second one exits
    /// the process with status 130, so a shutdown that stalls can still be
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Returns `HandlerInstalled` on every call after the first.
    pub fn install_interrupt_handler(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        if INTERRUPT_HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(WatchError::HandlerInstalled);
        }
        Ok(self.listen_with_escalation(tokio::signal::ctrl_c, || {
            std::process::exit(FORCED_EXIT_CODE)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::time::Duration;
    use tokio::sync::{Notify, oneshot};

    type SignalFuture = Pin<Box<dyn Future<Output = io::Result<()>> + Send>>;

    /// A signal source that fires once per `notify_one`.
    fn notify_signal(notify: &Arc<Notify>) -> impl FnMut() -> SignalFuture + Send + 'static {
        let notify = Arc::clone(notify);
        move || {
            let notify = Arc::clone(&notify);
            Box::pin(async move {
                notify.notified().await;
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();

        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger("first"));
        assert!(!shutdown.trigger("second"));
        assert!(shutdown.is_triggered());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_pending_until_triggered() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();

        let mut cancelled = tokio_test::task::spawn(token.cancelled());
        tokio_test::assert_pending!(cancelled.poll());

        shutdown.trigger("test");
        assert!(cancelled.is_woken());
        tokio_test::assert_ready!(cancelled.poll());
    }

    #[tokio::test]
    async fn test_listen_triggers_on_signal() {
        let shutdown = Shutdown::new();
        let (tx, rx) = oneshot::channel::<()>();
        let listener = shutdown.listen(async move {
            rx.await
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "signal source dropped"))
        });

        tx.send(()).unwrap();
        listener.await.unwrap();
        assert!(shutdown.is_triggered());
        assert!(shutdown.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_listen_exits_when_cancelled_elsewhere() {
        let shutdown = Shutdown::new();
        let listener = shutdown.listen(std::future::pending());

        shutdown.trigger("manual");
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_error_does_not_cancel() {
        let shutdown = Shutdown::new();
        let listener =
            shutdown.listen(async { Err(io::Error::new(io::ErrorKind::Other, "no console")) });

        listener.await.unwrap();
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_interrupt_handler_installs_once() {
        let shutdown = Shutdown::new();
        let first = shutdown.install_interrupt_handler();
        let second = shutdown.install_interrupt_handler();

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), WatchError::HandlerInstalled);
        // The handler outlives shutdown to catch a second Ctrl-C
        shutdown.trigger("test teardown");
        first.unwrap().abort();
    }

    #[tokio::test]
    async fn test_second_signal_forces_exit() {
        let shutdown = Shutdown::new();
        let signals = Arc::new(Notify::new());
        let (forced_tx, mut forced_rx) = oneshot::channel::<()>();
        let listener = shutdown.listen_with_escalation(notify_signal(&signals), move || {
            let _ = forced_tx.send(());
        });

        signals.notify_one();
        tokio::time::timeout(Duration::from_secs(2), shutdown.token().cancelled())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
        assert!(forced_rx.try_recv().is_err());

        signals.notify_one();
        listener.await.unwrap();
        assert!(forced_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_signal_after_manual_shutdown_forces_exit() {
        let shutdown = Shutdown::new();
        let signals = Arc::new(Notify::new());
        let (forced_tx, forced_rx) = oneshot::channel::<()>();
        let listener = shutdown.listen_with_escalation(notify_signal(&signals), move || {
            let _ = forced_tx.send(());
        });

        shutdown.trigger("manual");
        signals.notify_one();
        listener.await.unwrap();
        forced_rx.await.unwrap();
    }
}
