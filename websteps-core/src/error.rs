use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Planning(#[from] PlanningError),

    #[error("Cache error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("Cache connection poisoned")]
    CachePoisoned,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Test helper error: {0}")]
    TestHelper(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Problems that skip one item of a batch without failing the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("cannot determine port for {url}")]
    PortResolution { url: String },

    #[error("cannot parse {address:?} inside {context} as an IP address")]
    AddressParse { address: String, context: String },

    #[error("invalid endpoint plan entry: {0}")]
    InvalidPlanEntry(String),
}
