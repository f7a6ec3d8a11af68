use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::backoff::{retry_with_backoff, BackoffPolicy};
use super::source::{FrameStream, SharedStatusSource};
use super::state::{FeedEvent, FeedState};

/// Latest known backend status. `Stale` keeps the last value after the connection dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSnapshot<S> {
    Unknown,
    Fresh { status: S, received_at: DateTime<Utc> },
    Stale { status: S, received_at: DateTime<Utc> },
}

impl<S> FeedSnapshot<S> {
    pub fn status(&self) -> Option<&S> {
        match self {
            FeedSnapshot::Unknown => None,
            FeedSnapshot::Fresh { status, .. } | FeedSnapshot::Stale { status, .. } => {
                Some(status)
            }
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, FeedSnapshot::Fresh { .. })
    }

    fn into_stale(self) -> Self {
        match self {
            FeedSnapshot::Fresh {
                status,
                received_at,
            } => FeedSnapshot::Stale {
                status,
                received_at,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub reconnect_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(2_000),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Keeps one status snapshot current over baseline fetch + push stream, reconnecting forever.
pub struct StatusFeedClient<S> {
    name: String,
    snapshots: watch::Receiver<FeedSnapshot<S>>,
    states: watch::Receiver<FeedState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S> StatusFeedClient<S>
where
    S: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn spawn(source: SharedStatusSource, settings: FeedSettings) -> Self {
        let name = source.name().to_string();
        let (snapshot_tx, snapshots) = watch::channel(FeedSnapshot::Unknown);
        let (state_tx, states) = watch::channel(FeedState::Disconnected);
        let cancel = CancellationToken::new();

        let runner = FeedRunner::<S> {
            source,
            settings,
            snapshots: snapshot_tx,
            states: state_tx,
            cancel: cancel.clone(),
            connecting: AtomicBool::new(false),
            _status: PhantomData,
        };
        let task = tokio::spawn(runner.run());

        Self {
            name,
            snapshots,
            states,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<S>> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> FeedSnapshot<S> {
        self.snapshots.borrow().clone()
    }

    pub fn state(&self) -> FeedState {
        *self.states.borrow()
    }

    /// Cancels any pending reconnect, closes the live stream and waits for the task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(feed = %self.name, ?err, "status feed task ended abnormally");
            }
        }
    }
}

impl<S> Drop for StatusFeedClient<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct FeedRunner<S> {
    source: SharedStatusSource,
    settings: FeedSettings,
    snapshots: watch::Sender<FeedSnapshot<S>>,
    states: watch::Sender<FeedState>,
    cancel: CancellationToken,
    connecting: AtomicBool,
    _status: PhantomData<fn() -> S>,
}

/// Clears the re-entrancy flag however the connect attempt ends.
struct ConnectGuard<'a>(&'a AtomicBool);

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S> FeedRunner<S>
where
    S: DeserializeOwned + Clone + Send + Sync + 'static,
{
    #[instrument(skip_all, fields(feed = %self.source.name()))]
    async fn run(self) {
        self.advance(FeedEvent::Activate);

        loop {
            match self.connect().await {
                Ok(stream) => {
                    self.advance(FeedEvent::StreamOpened);
                    info!("status stream connected");
                    self.pump(stream).await;
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    self.advance(FeedEvent::StreamClosed);
                    info!("status stream closed");
                }
                Err(err) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    warn!(error = %format!("{err:#}"), "status feed activation failed");
                    self.advance(FeedEvent::ConnectFailed);
                }
            }

            self.mark_stale();
            debug!(
                delay_ms = self.settings.reconnect_delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                _ = self.cancel.cancelled() => break,
            }
            self.advance(FeedEvent::ReconnectDue);
        }

        self.mark_stale();
        self.advance(FeedEvent::Shutdown);
        info!("status feed stopped");
    }

    async fn connect(&self) -> anyhow::Result<FrameStream> {
        if self.connecting.swap(true, Ordering::SeqCst) {
            anyhow::bail!("connect already in progress");
        }
        let _guard = ConnectGuard(&self.connecting);

        let label = format!("{} baseline fetch", self.source.name());
        let baseline = retry_with_backoff(&self.settings.backoff, &self.cancel, &label, || {
            self.source.fetch_baseline()
        })
        .await?;
        self.publish_frame(&baseline)
            .context("Baseline status payload was not understood")?;

        tokio::select! {
            stream = self.source.open_stream() => stream.context("Failed to open status stream"),
            _ = self.cancel.cancelled() => Err(anyhow::anyhow!("status feed cancelled while connecting")),
        }
    }

    /// Applies frames until the stream ends, errors, or the feed is cancelled. Dropping the
    /// stream on return closes the socket.
    async fn pump(&self, mut stream: FrameStream) {
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if let Err(err) = self.publish_frame(&text) {
                            warn!(error = %err, "skipping unreadable status frame");
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "status stream errored");
                        break;
                    }
                    None => break,
                },
                _ = self.cancel.cancelled() => break,
            }
        }
    }

    fn publish_frame(&self, text: &str) -> anyhow::Result<()> {
        let status: S = serde_json::from_str(text).context("Failed to parse status snapshot")?;
        self.snapshots.send_replace(FeedSnapshot::Fresh {
            status,
            received_at: Utc::now(),
        });
        Ok(())
    }

    fn mark_stale(&self) {
        self.snapshots.send_modify(|snapshot| {
            let current = std::mem::replace(snapshot, FeedSnapshot::Unknown);
            *snapshot = current.into_stale();
        });
    }

    fn advance(&self, event: FeedEvent) {
        let current = *self.states.borrow();
        match current.next(event) {
            Some(next) => {
                debug!(from = %current, to = %next, ?event, "feed transition");
                self.states.send_replace(next);
            }
            None => warn!(state = %current, ?event, "ignoring illegal feed transition"),
        }
    }
}
