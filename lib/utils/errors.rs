//! Error handling wrappers

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A general purpose error type for the bellesub library
#[derive(Debug, Error)]
pub enum BellesubError {
    /// Invalid user input. Raised before any catalog request or job submission.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A required path is missing after an attempt to create it
    #[error("Path {} does not exist!", .0.display())]
    NotFound(PathBuf),

    /// The catalog could not be queried
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Directory handling and process IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A dispatcher worker could not complete its bookkeeping
    #[error("Worker error: {0}")]
    Worker(String),
}

// Catalog transport and HTTP status errors
impl From<reqwest::Error> for BellesubError {
    fn from(err: reqwest::Error) -> BellesubError {
        BellesubError::Catalog(err.to_string())
    }
}

// Worker and output reader join errors
impl From<tokio::task::JoinError> for BellesubError {
    fn from(err: tokio::task::JoinError) -> BellesubError {
        BellesubError::Worker(format!("Error joining on worker task: {:?}", err))
    }
}
