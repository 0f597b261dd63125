//! Error types for the supervisor

use thiserror::Error;

/// Unified error type for the supervisor
#[derive(Error, Debug)]
pub enum Error {
    /// The launcher executable is nowhere to be found
    #[error("\"{name}\" not found. Install it from https://docs.astral.sh/uv/")]
    Locator {
        /// Name of the missing executable
        name: String,
    },

    /// The worker could not be launched
    #[error("Failed to start worker: {0}")]
    Spawn(#[source] worker_process::Error),

    /// The worker reported a failure with an `ERROR:` line
    #[error("Error: {0}")]
    Protocol(String),

    /// A write to the worker's stdin failed
    #[error("write to worker failed: {0}")]
    StreamWrite(#[source] worker_process::Error),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
