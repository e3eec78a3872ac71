//! Error types for the preview engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A stream event arrived without one of its identifying fields.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A regeneration or hydration call failed (network or server error).
    #[error("Request failed: {0}")]
    RequestFailure(String),

    #[error("Unknown page: {0}")]
    UnknownPage(u32),

    #[error("Reorder rejected: {0}")]
    ReorderRejected(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::MalformedEvent(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
