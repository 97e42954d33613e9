//! # runner
//!
//! External command execution for the configuration agent.
//!
//! Everything the agent asks of the operating system (package managers,
//! inspection tools, user scripts) goes through a [`CommandRunner`]. The
//! runner only reports what happened: captured stdout, captured stderr and
//! the exit code. Deciding whether an exit code means success is left to
//! the caller, with [`CommandOutput::ensure_code`] as the common helper.
//!
//! ## Example
//!
//! ```no_run
//! use runner::{CommandRunner, CommandSpec, SystemRunner};
//!
//! let runner = SystemRunner::new();
//! let spec = CommandSpec::new("dpkg-query").args(["-W", "-f", "${Package}\\n"]);
//! let output = runner.run(&spec).unwrap();
//! output.ensure_code(&spec, &[0]).unwrap();
//! println!("{}", output.stdout_str());
//! ```
//!
//! ## Testing
//!
//! [`mock::MockRunner`] answers commands from a script and records every
//! invocation, so callers can be tested without touching the host.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod mock;
pub mod system;

pub use error::{Error, Result};
pub use mock::MockRunner;
pub use system::{CancelToken, SystemRunner};

use std::fmt;

/// Exit code reported when a process ended without one (killed by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    /// Program name or path
    pub program: String,
    /// Arguments, passed verbatim (no shell involved)
    pub args: Vec<String>,
    /// Extra environment variables layered over the agent's environment
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Captured standard output
    pub stdout: Vec<u8>,
    /// Captured standard error
    pub stderr: Vec<u8>,
    /// Exit code, or [`NO_EXIT_CODE`] if the process had none
    pub code: i32,
}

impl CommandOutput {
    /// Build an output from its parts.
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            code,
        }
    }

    /// A zero-exit output carrying `stdout`.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(0, stdout, Vec::new())
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Whether the exit code is in `allowed`.
    pub fn is_allowed(&self, allowed: &[i32]) -> bool {
        allowed.contains(&self.code)
    }

    /// Classify the exit code against an allow-list.
    ///
    /// Anything outside `allowed` becomes [`Error::ExitStatus`] carrying the
    /// captured output verbatim.
    pub fn ensure_code(&self, spec: &CommandSpec, allowed: &[i32]) -> Result<()> {
        if self.is_allowed(allowed) {
            return Ok(());
        }
        Err(Error::ExitStatus {
            command: spec.to_string(),
            code: self.code,
            stdout: self.stdout_str().trim().to_string(),
            stderr: self.stderr_str().trim().to_string(),
        })
    }
}

/// Capability to run external commands.
///
/// Implementations must not retry and must not impose their own timeout.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// Failing to start the process is an error; a non-zero exit is not.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Whether `program` can be found (absolute path or on `PATH`).
    fn exists(&self, program: &str) -> bool;

    /// Run a command and require a zero exit code.
    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec)?;
        output.ensure_code(spec, &[0])?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("apt-get")
            .args(["install", "-y"])
            .arg("curl")
            .env("DEBIAN_FRONTEND", "noninteractive");
        assert_eq!(spec.to_string(), "apt-get install -y curl");
        assert_eq!(spec.env.len(), 1);
    }

    #[test]
    fn test_ensure_code_allows_listed_codes() {
        let spec = CommandSpec::new("msiexec");
        let output = CommandOutput::new(3010, "", "");
        assert!(output.ensure_code(&spec, &[0, 1641, 3010]).is_ok());
    }

    #[test]
    fn test_ensure_code_reports_output() {
        let spec = CommandSpec::new("yum").arg("install");
        let output = CommandOutput::new(1, "some stdout\n", "No package foo available.\n");
        let err = output.ensure_code(&spec, &[0]).unwrap_err();
        match err {
            Error::ExitStatus {
                command,
                code,
                stdout,
                stderr,
            } => {
                assert_eq!(command, "yum install");
                assert_eq!(code, 1);
                assert_eq!(stdout, "some stdout");
                assert_eq!(stderr, "No package foo available.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
