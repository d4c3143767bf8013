//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::source::SourceError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating the configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The update source failed.
    #[error("Update source error: {0}")]
    Source(#[from] SourceError),

    /// Registering a shutdown signal listener failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
