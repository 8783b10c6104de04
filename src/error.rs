//! Error types for the planner core.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("invalid coordinate: lat={lat} lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    #[error("incomplete route: no distance from location {from} to location {to}")]
    IncompleteRoute { from: usize, to: usize },
    #[error("no cached distance matrix for location set {key} while offline")]
    MatrixUnavailable { key: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("worker pool: {0}")]
    Pool(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<rayon::ThreadPoolBuildError> for Error {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Error::Pool(err.to_string())
    }
}

/// Failure of a single routing backend attempt.
///
/// These are transient by policy: the resolver retries them and then degrades
/// to the next tier, they never reach the caller.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum BackendError {
    #[error("request timed out")]
    Timeout,
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("cancelled after a sibling backend answered")]
    Cancelled,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if let Some(status) = err.status() {
            BackendError::Status(status.as_u16())
        } else if err.is_decode() {
            BackendError::Malformed(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}
