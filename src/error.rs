use thiserror::Error;

/// Error taxonomy surfaced by every fallible operation. Transports map these
/// onto their own status vocabulary (the HTTP API uses 404/400/502/500).
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("invalid request: {0}")]
    Validation(String),
}

impl From<std::io::Error> for RelayError {
    fn from(e: std::io::Error) -> Self {
        RelayError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Storage(e.to_string())
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        RelayError::Storage(e.to_string())
    }
}

impl From<tokio_rusqlite::Error> for RelayError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        RelayError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayError::Upstream("model server timed out".to_string())
        } else {
            RelayError::Upstream(e.to_string())
        }
    }
}
