//! Quorum read errors
//!
//! Replica-level failures (dropped connections, 5xx answers, a minority of
//! malformed bodies) are absorbed by the reader. Only the variants below reach
//! the caller.

use thiserror::Error;
use zbox_transport::TransportError;

#[derive(Debug, Error)]
pub enum QuorumError {
    #[error("Failed to decode replica response: {0}")]
    Decode(String),

    #[error("Consensus not reached: {agreed}/{required} replicas agreed")]
    NoConsensus {
        agreed: usize,
        required: usize,
        /// Body of the last non-200 answer, if any
        last_error: Option<String>,
    },

    #[error("Quorum read timed out before any replica answered")]
    Timeout,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Field not found in consensus response: {0}")]
    MissingField(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type QuorumResult<T> = Result<T, QuorumError>;
