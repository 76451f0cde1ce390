//! Error types shared by the streamio port crates.

use thiserror::Error;

/// Errors raised synchronously by port configuration and lookup calls.
///
/// Congestion, consumer timeouts and downstream delivery failures are never
/// reported through this type; they are absorbed by the ports themselves.
#[derive(Debug, Error)]
pub enum PortError {
    /// A burst input port queue threshold must be at least one burst.
    #[error("queue threshold must be at least 1, got {requested}")]
    InvalidQueueThreshold {
        /// The rejected threshold.
        requested: usize,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the rejected value.
        reason: String,
    },

    /// The stream is not known to the port.
    #[error("unknown stream {stream_id}")]
    UnknownStream {
        /// The stream identifier that was looked up.
        stream_id: String,
    },

    /// No connection with this identifier exists on the port.
    #[error("unknown connection {connection_id}")]
    UnknownConnection {
        /// The connection identifier that was looked up.
        connection_id: String,
    },

    /// A connection with this identifier is already registered.
    #[error("connection {connection_id} already exists")]
    DuplicateConnection {
        /// The duplicated connection identifier.
        connection_id: String,
    },

    /// Configuration text could not be parsed.
    #[error("config parse error: {0}")]
    Config(String),
}

/// Result alias for port operations.
pub type Result<T> = std::result::Result<T, PortError>;
