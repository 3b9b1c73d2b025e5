//! Change aggregation for the manual-control front end.
//!
//! Local edits funnel through a [`ChangeAggregator`]: a burst of edits
//! within the quiet period collapses to one notification carrying the final
//! value, and a value equal to the last one emitted is dropped. A
//! [`StatePoller`] concurrently re-fetches the authoritative device state on
//! a fixed interval; callers bracket every outbound send with
//! [`StatePoller::suspend`] so a stale poll response cannot overwrite a
//! just-issued change.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const QUIET_PERIOD: Duration = Duration::from_millis(300);
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const POLL_INITIAL_DELAY: Duration = Duration::from_secs(5);

const CHANNEL_CAPACITY: usize = 32;

pub struct ChangeAggregator<T> {
    input: mpsc::Sender<T>,
    cancel: CancellationToken,
}

impl<T: Clone + PartialEq + Send + 'static> ChangeAggregator<T> {
    /// Spawn the aggregation task; coalesced notifications arrive on the
    /// returned receiver.
    pub fn new(quiet: Duration) -> (Self, mpsc::Receiver<T>) {
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(aggregate(input_rx, output_tx, quiet, cancel.clone()));
        (
            Self {
                input: input_tx,
                cancel,
            },
            output_rx,
        )
    }

    /// Record a local edit. Resets the quiet-period timer.
    pub async fn push(&self, value: T) {
        let _ = self.input.send(value).await;
    }
}

impl<T> Drop for ChangeAggregator<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn aggregate<T: Clone + PartialEq>(
    mut input: mpsc::Receiver<T>,
    output: mpsc::Sender<T>,
    quiet: Duration,
    cancel: CancellationToken,
) {
    let mut pending: Option<T> = None;
    let mut last_emitted: Option<T> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            value = input.recv() => match value {
                Some(value) => pending = Some(value),
                None => break,
            },
            // Recreated each iteration, so a fresh edit restarts the clock.
            _ = tokio::time::sleep(quiet), if pending.is_some() => {
                if let Some(value) = pending.take() {
                    if last_emitted.as_ref() == Some(&value) {
                        continue;
                    }
                    if output.send(value.clone()).await.is_err() {
                        break;
                    }
                    last_emitted = Some(value);
                }
            }
        }
    }
}

/// Periodic re-fetch of the authoritative device state.
pub struct StatePoller {
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl StatePoller {
    /// Spawn the poll task. The first fetch happens `initial_delay` after
    /// spawn, then every `interval`; results arrive on the returned receiver.
    pub fn spawn<F, Fut, T>(
        interval: Duration,
        initial_delay: Duration,
        fetch: F,
    ) -> (Self, mpsc::Receiver<T>)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = crate::Result<T>> + Send,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let paused = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        let task_paused = paused.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if task_paused.load(Ordering::SeqCst) {
                            continue;
                        }
                        match fetch().await {
                            Ok(value) => {
                                if tx.send(value).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => debug!("state poll failed: {e}"),
                        }
                    }
                }
            }
        });

        (Self { paused, cancel }, rx)
    }

    /// Pause polling until the returned guard drops. Bracket sends with it:
    /// the guard resumes polling on success and failure alike.
    pub fn suspend(&self) -> PollPause {
        self.paused.store(true, Ordering::SeqCst);
        PollPause {
            paused: self.paused.clone(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl Drop for StatePoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct PollPause {
    paused: Arc<AtomicBool>,
}

impl Drop for PollPause {
    fn drop(&mut self) {
        self.paused.store(false, Ordering::SeqCst);
    }
}
