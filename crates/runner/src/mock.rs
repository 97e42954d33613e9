//! Scripted runner for tests.
//!
//! ```
//! use runner::{CommandOutput, CommandRunner, CommandSpec, MockRunner};
//!
//! let mock = MockRunner::new().with_program("dpkg-query");
//! mock.respond("dpkg-query", &["-W"], CommandOutput::ok("curl installed\n"));
//!
//! let output = mock.run(&CommandSpec::new("dpkg-query").arg("-W")).unwrap();
//! assert_eq!(output.stdout_str(), "curl installed\n");
//! assert_eq!(mock.call_count("dpkg-query"), 1);
//! ```

use crate::error::{Error, Result};
use crate::{CommandOutput, CommandRunner, CommandSpec};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    SpawnError(String),
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    args_prefix: Vec<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, spec: &CommandSpec) -> bool {
        program_matches(&spec.program, &self.program)
            && spec.args.len() >= self.args_prefix.len()
            && spec.args.iter().zip(&self.args_prefix).all(|(a, b)| a == b)
    }
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    calls: Vec<CommandSpec>,
    programs: HashSet<String>,
}

/// A [`CommandRunner`] answering from registered rules.
///
/// Rules match on program and an argument prefix; the most recently
/// registered matching rule wins. Unmatched commands fail to spawn.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

impl MockRunner {
    /// Create an empty mock (no programs exist, no rules).
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `program` exists on the mocked host.
    pub fn with_program(self, program: &str) -> Self {
        self.lock().programs.insert(program.to_string());
        self
    }

    /// Answer commands matching `program` and `args_prefix` with `output`.
    pub fn respond(&self, program: &str, args_prefix: &[&str], output: CommandOutput) {
        self.push_rule(program, args_prefix, Reply::Output(output));
    }

    /// Make commands matching `program` and `args_prefix` fail to start.
    pub fn fail_to_spawn(&self, program: &str, args_prefix: &[&str], message: &str) {
        self.push_rule(program, args_prefix, Reply::SpawnError(message.to_string()));
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.lock().calls.clone()
    }

    /// Number of commands run for `program`.
    pub fn call_count(&self, program: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| program_matches(&c.program, program))
            .count()
    }

    /// Forget recorded calls (rules are kept).
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn push_rule(&self, program: &str, args_prefix: &[&str], reply: Reply) {
        self.lock().rules.push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|a| (*a).to_string()).collect(),
            reply,
        });
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut state = self.lock();
        state.calls.push(spec.clone());

        let reply = state
            .rules
            .iter()
            .rev()
            .find(|r| r.matches(spec))
            .map(|r| r.reply.clone());

        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::SpawnError(message)) => Err(Error::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::other(message),
            }),
            None => Err(Error::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no mock response for `{spec}`"),
                ),
            }),
        }
    }

    fn exists(&self, program: &str) -> bool {
        let state = self.lock();
        state.programs.iter().any(|p| program_matches(program, p))
    }
}

/// `actual` matches when it equals `expected` or ends with it as a path
/// component (`C:\GooGet\googet.exe` matches `googet.exe`).
fn program_matches(actual: &str, expected: &str) -> bool {
    actual == expected
        || actual
            .strip_suffix(expected)
            .is_some_and(|prefix| prefix.ends_with('/') || prefix.ends_with('\\'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_rule_wins() {
        let mock = MockRunner::new();
        mock.respond("rpm", &[], CommandOutput::ok("first"));
        mock.respond("rpm", &["--query"], CommandOutput::ok("second"));

        let out = mock
            .run(&CommandSpec::new("rpm").args(["--query", "--all"]))
            .unwrap();
        assert_eq!(out.stdout_str(), "second");

        let out = mock.run(&CommandSpec::new("rpm").arg("--upgrade")).unwrap();
        assert_eq!(out.stdout_str(), "first");
    }

    #[test]
    fn test_unmatched_command_fails_to_spawn() {
        let mock = MockRunner::new();
        let err = mock.run(&CommandSpec::new("yum")).unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(mock.call_count("yum"), 1);
    }

    #[test]
    fn test_program_matches_full_path() {
        let mock = MockRunner::new().with_program("googet.exe");
        assert!(mock.exists(r"C:\ProgramData\GooGet\googet.exe"));
        assert!(!mock.exists("notgooget.exe"));
        assert!(!mock.exists("apt-get"));
    }
}
