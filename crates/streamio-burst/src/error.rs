//! Downstream delivery errors.

use thiserror::Error;

/// Failure reported by a [`crate::transport::BurstTransport`].
///
/// The output port never returns these to the pushing application; they
/// only drive bisection and connection liveness.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The batch exceeds what the receiver accepts in one message.
    #[error("message of {bursts} bursts exceeds the transport size limit")]
    MessageTooLarge {
        /// Number of bursts in the rejected batch.
        bursts: usize,
    },

    /// The receiver cannot be reached.
    #[error("receiver unreachable: {reason}")]
    Unreachable {
        /// Transport-specific detail.
        reason: String,
    },

    /// Delivery failed for another reason.
    #[error("delivery failed: {reason}")]
    Failed {
        /// Transport-specific detail.
        reason: String,
    },

    /// The receiving system refused the call.
    #[error("delivery rejected: {reason}")]
    Rejected {
        /// Transport-specific detail.
        reason: String,
    },
}

/// Result alias for transport calls.
pub type Result<T> = std::result::Result<T, TransportError>;
