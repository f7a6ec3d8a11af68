use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use super::source::{FrameStream, StatusSource};

type Frame = anyhow::Result<String>;

/// In-memory transport with scripted connections; counts open sockets so tests can spot leaks.
pub struct MockStatusSource {
    name: String,
    baseline: String,
    baseline_failures: AtomicUsize,
    baseline_calls: AtomicUsize,
    connections: Mutex<VecDeque<mpsc::UnboundedReceiver<Frame>>>,
    connect_calls: AtomicUsize,
    open: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

struct SocketGuard {
    open: Arc<AtomicUsize>,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockStatusSource {
    pub fn new(name: &str, baseline: &str) -> Self {
        Self {
            name: name.to_string(),
            baseline: baseline.to_string(),
            baseline_failures: AtomicUsize::new(0),
            baseline_calls: AtomicUsize::new(0),
            connections: Mutex::new(VecDeque::new()),
            connect_calls: AtomicUsize::new(0),
            open: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue the next connection; dropping the returned sender closes that socket.
    pub fn push_connection(&self) -> mpsc::UnboundedSender<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .expect("mock connections poisoned")
            .push_back(rx);
        tx
    }

    pub fn fail_baseline(&self, times: usize) {
        self.baseline_failures.store(times, Ordering::SeqCst);
    }

    pub fn baseline_calls(&self) -> usize {
        self.baseline_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn open_sockets(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn max_open_sockets(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for MockStatusSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_baseline(&self) -> anyhow::Result<String> {
        self.baseline_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.baseline_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.baseline_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("mock baseline unavailable"));
        }
        Ok(self.baseline.clone())
    }

    async fn open_stream(&self) -> anyhow::Result<FrameStream> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let receiver = self
            .connections
            .lock()
            .map_err(|_| anyhow!("mock connections poisoned"))?
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted connection left"))?;

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);
        let guard = SocketGuard {
            open: self.open.clone(),
        };

        let frames = stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
            receiver
                .recv()
                .await
                .map(|frame| (frame, (receiver, guard)))
        });

        Ok(frames.boxed())
    }
}
