//! Error types for command execution.

use thiserror::Error;

/// Result type alias for command execution.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running external commands.
#[derive(Debug, Error)]
pub enum Error {
    /// The process could not be started at all.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Waiting on a started process failed.
    #[error("failed waiting for {program}: {source}")]
    Wait {
        /// Program being waited on
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The caller cancelled the command before it finished.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Program that was terminated
        program: String,
    },

    /// The process exited with a code outside the allowed set.
    #[error("{command} exited with code {code}\nstdout: {stdout}\nstderr: {stderr}")]
    ExitStatus {
        /// Full command line
        command: String,
        /// Exit code
        code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },
}

impl Error {
    /// Exit code carried by the error, if the process ran.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ExitStatus { code, .. } => Some(*code),
            _ => None,
        }
    }
}
