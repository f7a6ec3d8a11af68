use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the fixed reconnect delay.
    Backoff,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Activate,
    ConnectFailed,
    StreamOpened,
    StreamClosed,
    ReconnectDue,
    Shutdown,
}

impl FeedState {
    /// Transition table for the feed connection; `None` marks an illegal move.
    pub fn next(self, event: FeedEvent) -> Option<FeedState> {
        use FeedEvent::*;
        use FeedState::*;

        match (self, event) {
            (Stopped, _) => None,
            (_, Shutdown) => Some(Stopped),
            (Disconnected, Activate) => Some(Connecting),
            (Connecting, StreamOpened) => Some(Connected),
            (Connecting, ConnectFailed) => Some(Backoff),
            (Connected, StreamClosed) => Some(Backoff),
            (Backoff, ReconnectDue) => Some(Connecting),
            _ => None,
        }
    }
}

impl fmt::Display for FeedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FeedState::Disconnected => "disconnected",
            FeedState::Connecting => "connecting",
            FeedState::Connected => "connected",
            FeedState::Backoff => "backoff",
            FeedState::Stopped => "stopped",
        };

        write!(f, "{}", label)
    }
}
