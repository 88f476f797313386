//! Error types shared across the service.
//!
//! Refresh failures never leave the scheduler; they are logged at the cycle
//! boundary and the previous document stays authoritative.

/// Failure to obtain the node list from the upstream API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("network failure: upstream returned HTTP {0}")]
    Status(u16),

    #[error("parse failure: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FetchError {
    /// Transport errors and non-success statuses both count as network failures.
    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Status(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Parse(_))
    }
}

/// Outcome of a refresh cycle that did not replace the document.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("a refresh cycle is already in flight")]
    AlreadyRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("KML file not yet generated.")]
    NotYetAvailable,
}
