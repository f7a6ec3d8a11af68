pub mod backoff;
pub mod client;
#[cfg(test)]
pub mod mock;
pub mod reconcile;
pub mod source;
pub mod state;

pub use client::{FeedSettings, FeedSnapshot, StatusFeedClient};
pub use reconcile::StatusReconciler;
pub use source::{FrameStream, SharedStatusSource, StatusSource};
