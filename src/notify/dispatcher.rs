//! Consumes change events and reports them to a sink.

use crate::core::ChangeEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Receives what the dispatcher observes.
///
/// Any `FnMut(&ChangeEvent) + Send` closure is a sink that ignores closure
/// and cancellation.
pub trait EventSink: Send {
    /// A change event arrived.
    fn event(&mut self, event: &ChangeEvent);

    /// Every producer finished and the channel is drained.
    fn closed(&mut self) {}

    /// Cancellation was observed.
    fn cancelled(&mut self) {}
}

impl<F> EventSink for F
where
    F: FnMut(&ChangeEvent) + Send,
{
    fn event(&mut self, event: &ChangeEvent) {
        self(event)
    }
}

/// Sink that writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn event(&mut self, event: &ChangeEvent) {
        match event.error() {
            None => info!(sequence = event.sequence(), "registry change received"),
            Some(err) => warn!(sequence = event.sequence(), error = %err, "registry change received with error"),
        }
    }
}

/// Why the dispatcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// All senders were dropped.
    Closed,
    /// The cancellation token fired.
    Cancelled,
}

/// Summary returned when the dispatcher exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events handed to the sink.
    pub delivered: usize,
    /// How many of those carried an error.
    pub errors: usize,
    /// Why the loop ended.
    pub exit: DispatchExit,
}

/// Report events from `rx` to `sink` until the channel closes or `token` fires.
///
/// Each iteration races the next event against cancellation. Cancellation
/// wins ties, so pending events are dropped once it is observed.
///
/// # Examples
///
/// ```rust
/// use regwatch::core::ChangeEvent;
/// use regwatch::notify::{DispatchExit, consume};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let (tx, rx) = mpsc::channel(4);
/// tx.send(ChangeEvent::changed(1)).await.unwrap();
/// drop(tx);
///
/// let mut seen = Vec::new();
/// let report = consume(rx, CancellationToken::new(), |e: &ChangeEvent| seen.push(e.sequence())).await;
/// assert_eq!(report.exit, DispatchExit::Closed);
/// # }
/// ```
pub async fn consume<S>(
    mut rx: mpsc::Receiver<ChangeEvent>,
    token: CancellationToken,
    mut sink: S,
) -> DispatchReport
where
    S: EventSink,
{
    info!("consumer started");
    let mut delivered = 0;
    let mut errors = 0;

    let exit = loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                info!(delivered, "consumer cancelled");
                sink.cancelled();
                break DispatchExit::Cancelled;
            }
            next = rx.recv() => match next {
                Some(event) => {
                    delivered += 1;
                    if event.is_error() {
                        errors += 1;
                    }
                    sink.event(&event);
                }
                None => {
                    info!(delivered, "consumer channel closed");
                    sink.closed();
                    break DispatchExit::Closed;
                }
            },
        }
    };

    DispatchReport {
        delivered,
        errors,
        exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recording {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl Recording {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        fn push(&self, line: String) {
            self.lines.lock().unwrap().push(line);
        }
    }

    impl EventSink for Recording {
        fn event(&mut self, event: &ChangeEvent) {
            self.push(format!("event {}", event.sequence()));
        }

        fn closed(&mut self) {
            self.push("closed".to_string());
        }

        fn cancelled(&mut self) {
            self.push("cancelled".to_string());
        }
    }

    #[tokio::test]
    async fn test_reports_in_order_then_closure() {
        let (tx, rx) = mpsc::channel(8);
        for sequence in 1..=3 {
            tx.send(ChangeEvent::changed(sequence)).await.unwrap();
        }
        drop(tx);

        let sink = Recording::default();
        let report = consume(rx, CancellationToken::new(), sink.clone()).await;

        assert_eq!(sink.lines(), vec!["event 1", "event 2", "event 3", "closed"]);
        assert_eq!(
            report,
            DispatchReport {
                delivered: 3,
                errors: 0,
                exit: DispatchExit::Closed
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_pending_events() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ChangeEvent::changed(1)).await.unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let sink = Recording::default();
        let report = consume(rx, token, sink.clone()).await;

        assert_eq!(sink.lines(), vec!["cancelled"]);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.exit, DispatchExit::Cancelled);
    }

    #[tokio::test]
    async fn test_counts_error_events() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(ChangeEvent::changed(1)).await.unwrap();
        tx.send(ChangeEvent::failed(2, WatchError::notify("HKLM", "broken")))
            .await
            .unwrap();
        drop(tx);

        let report = consume(rx, CancellationToken::new(), LogSink).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.errors, 1);
    }

    #[tokio::test]
    async fn test_idle_consumer_is_pending_until_cancelled() {
        let (_tx, rx) = mpsc::channel::<ChangeEvent>(1);
        let token = CancellationToken::new();

        let mut task = tokio_test::task::spawn(consume(rx, token.clone(), |_: &ChangeEvent| {}));
        tokio_test::assert_pending!(task.poll());

        token.cancel();
        assert!(task.is_woken());
        let report = tokio_test::assert_ready!(task.poll());
        assert_eq!(report.exit, DispatchExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closure_sink() {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send(ChangeEvent::changed(1)).await.unwrap();
        });

        let mut count = 0;
        let report = consume(rx, CancellationToken::new(), |_: &ChangeEvent| count += 1).await;
        assert_eq!(count, 1);
        assert_eq!(report.exit, DispatchExit::Closed);
    }
}
