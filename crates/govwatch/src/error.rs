use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("invalid block height {0:?}")]
    Height(String),

    #[error("all {tried} {kind} endpoints failed for chain {chain}")]
    AllEndpointsFailed {
        chain: String,
        kind: &'static str,
        tried: usize,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("chain {0} not found")]
    UnknownChain(Uuid),

    #[error("tracked event {0} not found")]
    UnknownEvent(Uuid),

    #[error("notification sink error: {0}")]
    Sink(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
