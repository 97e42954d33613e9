//! Runner backed by real processes.

use crate::error::{Error, Result};
use crate::{CommandOutput, CommandRunner, CommandSpec, NO_EXIT_CODE};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often a cancellable wait polls the child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared flag used to terminate running commands early.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every command using this token.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs commands with `std::process::Command`, capturing both pipes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    cancel: Option<CancelToken>,
}

impl SystemRunner {
    /// Create a runner without cancellation support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that kills its children once `token` is cancelled.
    pub fn with_cancel(token: CancelToken) -> Self {
        Self {
            cancel: Some(token),
        }
    }

    fn wait(&self, child: &mut Child, program: &str) -> Result<ExitStatus> {
        let wait_err = |source| Error::Wait {
            program: program.to_string(),
            source,
        };

        let Some(token) = &self.cancel else {
            return child.wait().map_err(wait_err);
        };

        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if token.is_cancelled() {
                log::debug!("Cancelling {}", program);
                // The child may already have exited between the two checks.
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Cancelled {
                    program: program.to_string(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        log::debug!("Running: {}", spec);

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child, &spec.program)?;

        let output = CommandOutput {
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            code: status.code().unwrap_or(NO_EXIT_CODE),
        };

        log::debug!("{} exited with code {}", spec.program, output.code);
        Ok(output)
    }

    fn exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe
            && let Err(e) = pipe.read_to_end(&mut buf)
        {
            log::warn!("Failed to read child output: {}", e);
        }
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output_and_code() {
        let runner = SystemRunner::new();
        let spec = CommandSpec::new("/bin/sh").args(["-c", "echo out; echo err >&2; exit 7"]);
        let output = runner.run(&spec).unwrap();
        assert_eq!(output.code, 7);
        assert_eq!(output.stdout_str(), "out\n");
        assert_eq!(output.stderr_str(), "err\n");
    }

    #[test]
    fn test_run_passes_environment() {
        let runner = SystemRunner::new();
        let spec = CommandSpec::new("/bin/sh")
            .args(["-c", "printf %s \"$AGENT_TEST_VALUE\""])
            .env("AGENT_TEST_VALUE", "hello");
        let output = runner.run(&spec).unwrap();
        assert_eq!(output.stdout_str(), "hello");
    }

    #[test]
    fn test_spawn_failure_is_an_error() {
        let runner = SystemRunner::new();
        let spec = CommandSpec::new("/definitely/not/a/real/program");
        assert!(matches!(runner.run(&spec), Err(Error::Spawn { .. })));
    }

    #[test]
    fn test_cancelled_command_is_killed() {
        let token = CancelToken::new();
        token.cancel();
        let runner = SystemRunner::with_cancel(token);
        let spec = CommandSpec::new("/bin/sh").args(["-c", "sleep 30"]);
        assert!(matches!(runner.run(&spec), Err(Error::Cancelled { .. })));
    }

    #[test]
    fn test_exists() {
        let runner = SystemRunner::new();
        assert!(runner.exists("/bin/sh"));
        assert!(!runner.exists("no-such-program-osconfig-test"));
    }
}
