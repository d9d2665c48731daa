//! Error types for calls into external collaborators.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Errors returned by the cluster API and metrics-source adapters.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
