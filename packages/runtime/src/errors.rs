//! Error types for the preview runtime

use folio_engine::EngineError;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by a regeneration or hydration collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Failed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl From<CollaboratorError> for EngineError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::Failed(reason) => EngineError::RequestFailure(reason),
            CollaboratorError::Timeout(after) => {
                EngineError::RequestFailure(format!("timed out after {:?}", after))
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Preview driver has stopped")]
    DriverStopped,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
