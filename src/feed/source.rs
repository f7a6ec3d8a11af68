use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Raw text frames from a live status stream; the stream ending means the socket closed.
pub type FrameStream = BoxStream<'static, anyhow::Result<String>>;

/// Transport behind a status feed: one baseline fetch plus a push stream.
#[async_trait]
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_baseline(&self) -> anyhow::Result<String>;
    async fn open_stream(&self) -> anyhow::Result<FrameStream>;
}

pub type SharedStatusSource = Arc<dyn StatusSource>;
