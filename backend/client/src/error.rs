use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("refresh rejected: {0}")]
    RefreshFailed(String),

    #[error("malformed token")]
    MalformedToken,

    #[error("invalid response payload: {0}")]
    Payload(String),
}

/// Error surfaced by the batch loader: a human-readable message plus the
/// pages the failed request covered. Cloneable so every caller collapsed
/// onto one in-flight request sees the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to load pages {pages:?}: {message}")]
pub struct LoadError {
    pub message: String,
    pub pages: Vec<u32>,
}

impl LoadError {
    pub fn new(message: impl Into<String>, pages: Vec<u32>) -> Self {
        Self {
            message: message.into(),
            pages,
        }
    }
}
