//! Error types for resource reconciliation.
//!
//! Errors are categorized so callers can report them consistently: a
//! precondition violation means the caller misused the API, an environment
//! error means the resource cannot be handled on this host at all, and so on.
//! Nothing in this crate retries; every error reaches the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A method was called out of order
    Precondition,
    /// The host lacks what the resource needs (e.g. a package manager)
    Environment,
    /// The descriptor is malformed or asks for an unsupported combination
    InvalidResource,
    /// Download, checksum or filesystem failure
    Io,
    /// An external command failed or returned an unexpected code
    Subprocess,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Precondition => "Method called out of order",
            Self::Environment => "Host environment mismatch",
            Self::InvalidResource => "Invalid or unsupported resource",
            Self::Io => "I/O failure",
            Self::Subprocess => "Command failure",
        }
    }
}

/// Errors that can occur while validating, checking or enforcing a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// `check_state`, `enforce_state` or `populate_output` before a successful `validate`.
    #[error("{operation} called before validate")]
    NotValidated {
        /// Operation attempted
        operation: &'static str,
    },

    /// `validate` called a second time.
    #[error("validate already called for resource {id:?}")]
    AlreadyValidated {
        /// Resource id
        id: String,
    },

    /// The descriptor is malformed.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// The requested combination cannot be handled (e.g. PowerShell on Linux).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The package manager or tool a resource needs is missing.
    #[error("cannot manage {resource} because {tool} does not exist on the system")]
    ManagerNotFound {
        /// What was being managed (e.g. "deb package \"foo\"")
        resource: String,
        /// Missing executable
        tool: String,
    },

    /// Output of an inspection or listing command could not be understood.
    #[error("failed to parse {what}: {message}")]
    Parse {
        /// What was being parsed
        what: String,
        /// Why it failed
        message: String,
    },

    /// A package install or remove failed.
    #[error("error running {action} for {kind} package {package:?}: {source}")]
    Enforce {
        /// "install" or "remove"
        action: &'static str,
        /// Package manager family
        kind: &'static str,
        /// Package name or artifact path
        package: String,
        /// Underlying command failure
        #[source]
        source: runner::Error,
    },

    /// A script exited with a code outside its contract.
    #[error(
        "unexpected return code {code} from {step} step\nstdout: {stdout}\nstderr: {stderr}"
    )]
    ExitCode {
        /// "validate" or "enforce"
        step: &'static str,
        /// Exit code
        code: i32,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// A script output file exceeded the size cap.
    #[error("output file {path} is larger than {limit} bytes")]
    OutputTooLarge {
        /// Output file path
        path: PathBuf,
        /// Maximum size in bytes
        limit: u64,
    },

    /// A GPG key could not be decoded.
    #[error("invalid GPG key from {uri}: {message}")]
    GpgKey {
        /// Key URI
        uri: String,
        /// Decode error
        message: String,
    },

    /// Command execution failure.
    #[error(transparent)]
    Command(#[from] runner::Error),

    /// Download, checksum or atomic write failure.
    #[error(transparent)]
    Fetch(#[from] fetch::Error),

    /// Filesystem error on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Shorthand for [`Error::InvalidResource`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidResource(message.into())
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotValidated { .. } | Error::AlreadyValidated { .. } => {
                ErrorCategory::Precondition
            }
            Error::ManagerNotFound { .. } => ErrorCategory::Environment,
            Error::InvalidResource(_) | Error::Unsupported(_) => ErrorCategory::InvalidResource,
            Error::Fetch(_) | Error::Io { .. } | Error::Json(_) | Error::GpgKey { .. } => {
                ErrorCategory::Io
            }
            Error::Parse { .. }
            | Error::Enforce { .. }
            | Error::ExitCode { .. }
            | Error::OutputTooLarge { .. }
            | Error::Command(_) => ErrorCategory::Subprocess,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::NotValidated {
                operation: "check_state"
            }
            .category(),
            ErrorCategory::Precondition
        );
        assert_eq!(
            Error::ManagerNotFound {
                resource: "apt package \"curl\"".into(),
                tool: "apt-get".into()
            }
            .category(),
            ErrorCategory::Environment
        );
        assert_eq!(
            Error::invalid("no package").category(),
            ErrorCategory::InvalidResource
        );
    }

    #[test]
    fn test_manager_not_found_message() {
        let err = Error::ManagerNotFound {
            resource: "yum package \"vim\"".into(),
            tool: "yum".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot manage yum package \"vim\" because yum does not exist on the system"
        );
    }
}
