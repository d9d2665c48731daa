use std::time::Duration;

use qscale_state::CollaboratorError;
use thiserror::Error;

pub type ScaleResult<T> = Result<T, ScaleError>;

#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("cluster call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cluster rejected desired count {count} with status {status}")]
    Rejected { count: u32, status: u16 },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}
