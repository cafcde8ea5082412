//! Error types for configstore
//!
//! This module defines all error types used throughout the replica, the
//! stream consumers and the remote facade.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Note that a read that finds nothing is *not* an error: `get` and `lookup`
//! return `None` for entities that were deleted or have not arrived yet.

use crate::key::EntityKey;
use thiserror::Error;

/// Result type alias for configstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for configstore
#[derive(Debug, Error)]
pub enum Error {
    /// An entity key was built from an empty path
    #[error("Entity key path cannot be empty")]
    EmptyKeyPath,

    /// The operation needs a key whose final element carries a name
    #[error("Entity key is incomplete")]
    IncompleteKey,

    /// The remote store has no entity under this key
    #[error("Entity not found: {0}")]
    NotFound(EntityKey),

    /// The remote store already holds an entity under this key
    #[error("Entity already exists: {0}")]
    AlreadyExists(EntityKey),

    /// A change event that cannot belong to the stream it arrived on
    #[error("Malformed {kind} event: {reason}")]
    MalformedEvent {
        /// Entity kind of the stream
        kind: String,
        /// What was wrong with the event
        reason: String,
    },

    /// The per-kind change stream reported an error
    #[error("Change stream for {kind} failed: {reason}")]
    StreamFailed {
        /// Entity kind of the stream
        kind: String,
        /// Error reported by the stream
        reason: String,
    },

    /// No replica is registered for this entity kind
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    /// Configuration could not be parsed or is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error reported by the remote collaborator
    #[error("Remote error: {0}")]
    Remote(String),

    /// The connection or remote has been shut down
    #[error("Connection closed")]
    Closed,

    /// I/O error, e.g. a worker thread could not be spawned
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Build a `StreamFailed` error for the given kind
    pub fn stream_failed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::StreamFailed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Build a `MalformedEvent` error for the given kind
    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedEvent {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the entity does not exist remotely
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
