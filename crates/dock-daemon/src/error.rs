use thiserror::Error;

/// Failure of one capability call.  Callers in the background treat every
/// variant as recoverable and fall back to a default value.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("no such node: {0}")]
    NotFound(String),

    /// The receiving page is gone (tab closed or navigated away).
    #[error("peer {0} is gone")]
    PeerGone(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("invalid operation: {0}")]
    Invalid(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Fetch(e.to_string())
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;
