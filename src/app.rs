//! Wires a watcher and a dispatcher together and waits for both.

use crate::error::{Result, WatchError};
use crate::notify::{DispatchReport, EventSink, Watcher, consume};
use crate::settings::WatchConfig;
use crate::shutdown::Shutdown;
use crate::sources::ChangeSource;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of a complete run.
#[derive(Debug)]
pub struct RunReport {
    /// How the watcher ended: `Ok` when stopped, the fatal error otherwise.
    pub watcher: Result<()>,
    /// What the dispatcher saw.
    pub dispatch: DispatchReport,
}

impl RunReport {
    /// Whether the watcher stopped without a fatal error.
    pub fn is_clean(&self) -> bool {
        self.watcher.is_ok()
    }
}

/// Watch `config.target` through `source`, reporting to `sink`, until
/// `shutdown` fires or the watcher fails.
///
/// A failed watcher closes the channel, which ends the dispatcher; the
/// process-wide token is left untouched.
///
/// # Errors
///
/// Returns `TaskFailed` if the dispatcher task panics; the watcher is
/// stopped first. Watcher failures are reported in [`RunReport::watcher`].
pub async fn run<S>(
    config: &WatchConfig,
    source: Arc<dyn ChangeSource>,
    sink: S,
    shutdown: Arc<Shutdown>,
) -> Result<RunReport>
where
    S: EventSink + 'static,
{
    let token = shutdown.token();
    let watcher =
        Watcher::new(source, config.target.clone()).with_poll_interval(config.poll_interval());
    info!(
        target_key = %config.target,
        filter = %config.filter().describe(),
        subtree = config.watch_subtree,
        "starting registry watch"
    );

    // The watcher also stops when the dispatcher ends, even if it ended by
    // panicking and the key stays quiet
    let watch_token = token.child_token();
    let (rx, watcher_task) = watcher.spawn(config.channel_capacity, watch_token.clone());
    let dispatcher_task = tokio::spawn(consume(rx, token, sink));
    let dispatcher_task = async move {
        let result = dispatcher_task.await;
        watch_token.cancel();
        result
    };

    let (watcher_result, dispatch_result) = tokio::join!(watcher_task, dispatcher_task);

    let watcher = watcher_result
        .map_err(|e| WatchError::TaskFailed(format!("watcher task: {}", e)))
        .and_then(|result| result);
    if let Err(err) = &watcher {
        error!(error = %err, "watch ended with an error");
    }

    let dispatch =
        dispatch_result.map_err(|e| WatchError::TaskFailed(format!("dispatcher task: {}", e)))?;

    info!(
        delivered = dispatch.delivered,
        exit = ?dispatch.exit,
        "registry watch finished"
    );
    Ok(RunReport { watcher, dispatch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChangeEvent;
    use crate::notify::DispatchExit;
    use crate::sources::ScriptedSource;
    use std::time::Duration;

    fn config() -> WatchConfig {
        WatchConfig {
            target: r"HKLM\SOFTWARE\Example".parse().unwrap(),
            poll_interval_ms: 20,
            ..WatchConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_failure_ends_run_without_cancelling() {
        let source = Arc::new(ScriptedSource::new().missing("not found"));
        let shutdown = Shutdown::new();

        let report = run(&config(), source, |_: &ChangeEvent| {}, Arc::clone(&shutdown))
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert!(matches!(report.watcher, Err(WatchError::OpenError { .. })));
        assert_eq!(report.dispatch.delivered, 0);
        assert_eq!(report.dispatch.exit, DispatchExit::Closed);
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_stops_both_tasks() {
        let source = Arc::new(ScriptedSource::new());
        let shutdown = Shutdown::new();

        let trigger = Arc::clone(&shutdown);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.trigger("test");
        });

        let report = run(&config(), source, |_: &ChangeEvent| {}, shutdown)
            .await
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(report.dispatch.exit, DispatchExit::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_sink_stops_watcher_on_quiet_key() {
        // One change, then the key stays quiet
        let source = ScriptedSource::new().fire_after(Duration::from_millis(10));
        let counters = source.counters();
        let shutdown = Shutdown::new();

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run(
                &config(),
                Arc::new(source),
                |event: &ChangeEvent| {
                    if event.sequence() > 0 {
                        panic!("sink failure");
                    }
                },
                Arc::clone(&shutdown),
            ),
        )
        .await
        .expect("run kept waiting on the watcher after the dispatcher died");

        assert!(matches!(result, Err(WatchError::TaskFailed(_))));
        assert_eq!(counters.closes(), 1);
        assert!(!shutdown.is_triggered());
    }
}
