//! Exec resources: user scripts deciding and enforcing compliance.
//!
//! The validate step exits 100 when the host is compliant and 101 when it
//! is not. The enforce step exits 100 on success. Any other code is an
//! error carrying the step's output.

use super::source::{localize, remove_working_dir, working_dir};
use super::{ExecOutput, ManagedResources, Reconcile, ResourceCompliance};
use crate::context::{AgentContext, Platform};
use crate::descriptor::{ExecResource, ExecSpec, FileSource, Interpreter};
use crate::error::{Error, Result};
use crate::packages::POWERSHELL;
use fetch::RemoteSource;
use runner::CommandSpec;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Exit code: compliant (validate) or enforced (enforce).
pub const EXIT_IN_DESIRED_STATE: i32 = 100;
/// Exit code: not compliant (validate).
pub const EXIT_NOT_IN_DESIRED_STATE: i32 = 101;
/// Largest output file read after enforcement, in bytes.
pub const MAX_OUTPUT_FILE_SIZE: u64 = 100 * 1024;

const SCRIPT_MODE: u32 = 0o755;

/// A step ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    path: PathBuf,
    interpreter: Interpreter,
    args: Vec<String>,
    output_file_path: Option<PathBuf>,
}

impl Step {
    fn command(&self, platform: Platform) -> CommandSpec {
        let path = self.path.display().to_string();
        let base = match (self.interpreter, platform) {
            (Interpreter::Shell, Platform::Unix) => CommandSpec::new("/bin/sh").arg(path),
            (Interpreter::Powershell, _) => CommandSpec::new(POWERSHELL)
                .args(["-NonInteractive", "-NoProfile", "-ExecutionPolicy", "Bypass", "-File"])
                .arg(path),
            (Interpreter::None | Interpreter::Shell, _) => CommandSpec::new(path),
        };
        base.args(self.args.iter().cloned())
    }
}

/// Script file name for an interpreter on a platform.
fn script_name(interpreter: Interpreter, platform: Platform) -> &'static str {
    match (interpreter, platform) {
        (Interpreter::Powershell, _) => "script.ps1",
        (_, Platform::Windows) => "script.cmd",
        (_, Platform::Unix) => "script",
    }
}

/// Name of the remote object a file source points at.
fn download_name(source: &FileSource) -> Option<String> {
    let remote = match (&source.remote, &source.gcs) {
        (Some(remote), _) => RemoteSource::http(&remote.uri),
        (None, Some(gcs)) => RemoteSource::gcs(&gcs.bucket, &gcs.object, gcs.generation),
        (None, None) => return None,
    };
    remote.file_name().map(ToString::to_string)
}

/// Exec resource handler.
#[derive(Debug)]
pub struct ExecHandler {
    resource: ExecResource,
    validate: Option<Step>,
    enforce: Option<Step>,
    enforcement_output: Option<Vec<u8>>,
    temp_dir: Option<TempDir>,
}

impl ExecHandler {
    /// Handler for `resource`.
    pub fn new(resource: ExecResource) -> Self {
        Self {
            resource,
            validate: None,
            enforce: None,
            enforcement_output: None,
            temp_dir: None,
        }
    }

    /// Put the step's executable on disk under `<temp>/<name>/`.
    fn prepare(&mut self, ctx: &AgentContext, spec: &ExecSpec, name: &str) -> Result<Step> {
        if spec.interpreter == Interpreter::Powershell && !ctx.platform.is_windows() {
            return Err(Error::Unsupported(
                "interpreter POWERSHELL is only supported on Windows".into(),
            ));
        }

        let dir = working_dir(&mut self.temp_dir)?.join(name);
        let path = match (&spec.script, &spec.file) {
            (Some(script), None) => {
                let path = dir.join(script_name(spec.interpreter, ctx.platform));
                fetch::atomic_write(&path, script.as_bytes(), Some(SCRIPT_MODE))?;
                path
            }
            (None, Some(source)) => {
                fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
                let file_name = match spec.interpreter {
                    Interpreter::Powershell => None,
                    _ => download_name(source),
                }
                .unwrap_or_else(|| script_name(spec.interpreter, ctx.platform).to_string());
                let copy = localize(ctx, source, &dir, &file_name)?;
                if copy.checksum.is_some() {
                    make_executable(&copy.path)?;
                }
                copy.path
            }
            (None, None) => {
                return Err(Error::invalid(format!("exec {name} step needs a script or a file")));
            }
            (Some(_), Some(_)) => {
                return Err(Error::invalid(format!(
                    "exec {name} step has both a script and a file"
                )));
            }
        };

        Ok(Step {
            path,
            interpreter: spec.interpreter,
            args: spec.args.clone(),
            output_file_path: (!spec.output_file_path.is_empty())
                .then(|| PathBuf::from(&spec.output_file_path)),
        })
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(SCRIPT_MODE))
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Read an output file, refusing anything larger than [`MAX_OUTPUT_FILE_SIZE`].
fn read_output_file(path: &Path) -> Result<Vec<u8>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("Output file {} was not written", path.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    let mut data = Vec::new();
    file.take(MAX_OUTPUT_FILE_SIZE + 1)
        .read_to_end(&mut data)
        .map_err(|e| Error::io(path, e))?;
    if data.len() as u64 > MAX_OUTPUT_FILE_SIZE {
        return Err(Error::OutputTooLarge {
            path: path.to_path_buf(),
            limit: MAX_OUTPUT_FILE_SIZE,
        });
    }
    Ok(data)
}

impl Reconcile for ExecHandler {
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources> {
        let resource = self.resource.clone();
        let validate = self.prepare(ctx, &resource.validate, "validate")?;
        let enforce = match &resource.enforce {
            Some(spec) => Some(self.prepare(ctx, spec, "enforce")?),
            None => None,
        };
        self.validate = Some(validate);
        self.enforce = enforce;
        Ok(ManagedResources::default())
    }

    fn check_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        let step = self.validate.as_ref().ok_or(Error::NotValidated {
            operation: "check_state",
        })?;

        let output = ctx.runner.run(&step.command(ctx.platform))?;
        match output.code {
            EXIT_IN_DESIRED_STATE => Ok(true),
            EXIT_NOT_IN_DESIRED_STATE => Ok(false),
            code => Err(Error::ExitCode {
                step: "validate",
                code,
                stdout: output.stdout_str(),
                stderr: output.stderr_str(),
            }),
        }
    }

    fn enforce_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        if self.validate.is_none() {
            return Err(Error::NotValidated {
                operation: "enforce_state",
            });
        }
        let Some(step) = &self.enforce else {
            return Err(Error::invalid("exec resource has no enforce step"));
        };

        log::info!("Running enforce step {}", step.path.display());
        let output = ctx.runner.run(&step.command(ctx.platform))?;
        if output.code != EXIT_IN_DESIRED_STATE {
            return Err(Error::ExitCode {
                step: "enforce",
                code: output.code,
                stdout: output.stdout_str(),
                stderr: output.stderr_str(),
            });
        }

        if let Some(path) = &step.output_file_path {
            self.enforcement_output = Some(read_output_file(path)?);
        }
        Ok(true)
    }

    fn populate_output(&self, compliance: &mut ResourceCompliance) {
        if let Some(output) = &self.enforcement_output {
            compliance.exec = Some(ExecOutput {
                enforcement_output: output.clone(),
            });
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        remove_working_dir(&mut self.temp_dir)
    }
}
