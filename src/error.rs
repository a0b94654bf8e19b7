use std::time::Duration;

use thiserror::Error;

use crate::session::SessionState;

/// Failure of a request/response call to the analysis backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}

/// Failure to open the feedback channel. Never surfaced past the channel
/// client; it feeds the reconnect path instead.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("timed out opening channel after {0:?}")]
    Timeout(Duration),

    #[error("channel transport error: {0}")]
    Transport(String),
}

/// Errors the session controller reports to its caller.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("cannot {operation} while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error(transparent)]
    Backend(#[from] ApiError),

    #[error("session was torn down before {0} completed")]
    Abandoned(&'static str),

    #[error("invalid landmark sample: {0}")]
    InvalidSample(String),
}

pub type Result<T, E = CoachError> = std::result::Result<T, E>;
