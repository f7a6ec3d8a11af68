use thiserror::Error;

use super::types::DeleteConflict;

/// Failure taxonomy for backend calls; coordinators turn each variant into store state.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(String),
    #[error("backend returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("resource is currently processing")]
    Conflict(DeleteConflict),
    #[error("request cancelled")]
    Cancelled,
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}
