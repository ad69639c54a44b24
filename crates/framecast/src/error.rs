//! Error types for framecast

/// Result type alias using framecast Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a streaming session
///
/// Every variant is local to one session: the supervisor maps it to a
/// close reason and tears the session down, and no variant ever crashes
/// the serving process or affects other sessions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No asset has been uploaded for the session
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Malformed or out-of-sequence signaling message
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The negotiation capability rejected the offer
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Asset unreadable or corrupt frame
    #[error("Decode error: {0}")]
    Decode(String),

    /// Frame write failed or the peer disconnected
    #[error("Transport error: {0}")]
    Transport(String),

    /// Session registry error (duplicate id, capacity, unknown session)
    #[error("Session error: {0}")]
    Session(String),

    /// Blob storage error while persisting an upload
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Errors raised by the frame transport itself
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}
