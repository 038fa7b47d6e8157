/// Core error type.
///
/// Adapter crates map their specific errors into this type (or into
/// [`TransportError`] for outbound calls) so the relay can decide between
/// log-and-continue and backoff-and-reconnect.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("external error: {0}")]
    External(String),
}

/// Tagged failure reported by every call into the chat transport.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The platform asked us to back off for `wait_secs` seconds.
    #[error("rate limited, retry after {wait_secs}s")]
    RateLimited { wait_secs: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("transport error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;
