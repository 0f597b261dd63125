//! Error types for worker process management

use thiserror::Error;

/// Errors raised while launching or talking to a worker process
#[derive(Error, Debug)]
pub enum Error {
    /// The executable could not be launched (missing file, permission denied, ...)
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        /// The program that was being launched
        program: String,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The worker already emitted its terminal event
    #[error("worker process has already exited")]
    ProcessExited,

    /// Writing to the worker's input stream failed
    #[error("failed to write to worker stdin: {0}")]
    StreamWrite(#[source] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
