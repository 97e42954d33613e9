//! Execution engine - drives every resource of a policy through
//! validate, check and enforce

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use rayon::prelude::*;
use reconcile::{
    AgentContext, ManagedResources, OsPolicyResource, PolicyResource, ResourceCompliance,
};
use std::fmt;
use std::sync::Arc;

use crate::progress;

/// How far each resource is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Validate only
    Validate,
    /// Validate and check
    Check,
    /// Validate, check and enforce what is out of state
    Apply,
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub mode: Mode,
    /// Don't enforce, just report what would be enforced
    pub dry_run: bool,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Hide the progress bar
    pub quiet: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Apply,
            dry_run: false,
            jobs: 1,
            quiet: false,
        }
    }
}

/// Lifecycle step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Check,
    Enforce,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validate => "validate",
            Self::Check => "check",
            Self::Enforce => "enforce",
        })
    }
}

/// Where a resource ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Validated; nothing else was asked
    Valid,
    /// Already in the desired state
    Compliant,
    /// Out of the desired state and left that way
    NonCompliant,
    /// Enforced and confirmed by a second check
    Enforced,
    Failed { stage: Stage, error: String },
}

/// Result for one resource.
#[derive(Debug, Clone)]
pub struct ResourceReport {
    pub id: String,
    pub resource_type: Option<&'static str>,
    pub outcome: Outcome,
    pub managed: Option<ManagedResources>,
    pub enforcement_output: Option<Vec<u8>>,
}

/// Summary of execution results
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    pub valid: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub enforced: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    pub fn from_reports(reports: &[ResourceReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                Outcome::Valid => summary.valid += 1,
                Outcome::Compliant => summary.compliant += 1,
                Outcome::NonCompliant => summary.non_compliant += 1,
                Outcome::Enforced => summary.enforced += 1,
                Outcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// 0 when everything is in state, 1 on failures, 2 when resources
    /// were left out of state.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else if self.non_compliant > 0 {
            2
        } else {
            0
        }
    }
}

/// Run every resource of a policy against a shared context.
///
/// Reports come back in policy order whatever the number of jobs.
pub fn execute(
    ctx: &Arc<AgentContext>,
    resources: &[PolicyResource],
    opts: &ExecuteOptions,
) -> Result<Vec<ResourceReport>> {
    let label = match opts.mode {
        Mode::Validate => "Validating",
        Mode::Check => "Checking",
        Mode::Apply if opts.dry_run => "Checking",
        Mode::Apply => "Applying",
    };
    let pb = progress::bar(resources.len() as u64, label, opts.quiet);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .context("Failed to create resource thread pool")?;

    let reports: Vec<ResourceReport> = pool.install(|| {
        resources
            .par_iter()
            .map(|descriptor| {
                let report = process(ctx, descriptor, opts);
                pb.set_message(format!("{} {}", symbol(&report.outcome), report.id));
                pb.inc(1);
                report
            })
            .collect()
    });

    pb.finish_and_clear();
    Ok(reports)
}

fn process(
    ctx: &Arc<AgentContext>,
    descriptor: &PolicyResource,
    opts: &ExecuteOptions,
) -> ResourceReport {
    let mut resource = OsPolicyResource::new(Arc::clone(ctx));
    let outcome = run_stages(&mut resource, descriptor, opts);

    let mut compliance = ResourceCompliance::default();
    let enforcement_output = match resource.populate_output(&mut compliance) {
        Ok(()) => compliance.exec.map(|exec| exec.enforcement_output),
        Err(_) => None,
    };

    let report = ResourceReport {
        id: descriptor.id.clone(),
        resource_type: resource.resource_type(),
        outcome,
        managed: resource.managed_resources().cloned(),
        enforcement_output,
    };

    if let Err(e) = resource.cleanup() {
        log::warn!("Cleanup of {:?} failed: {}", report.id, e);
    }
    report
}

fn run_stages(
    resource: &mut OsPolicyResource,
    descriptor: &PolicyResource,
    opts: &ExecuteOptions,
) -> Outcome {
    let failed = |stage: Stage, e: reconcile::Error| {
        log::debug!("{:?} failed to {}: {}", descriptor.id, stage, e);
        Outcome::Failed {
            stage,
            error: e.to_string(),
        }
    };

    if let Err(e) = resource.validate(descriptor) {
        return failed(Stage::Validate, e);
    }
    if opts.mode == Mode::Validate {
        return Outcome::Valid;
    }

    match resource.check_state() {
        Ok(true) => return Outcome::Compliant,
        Ok(false) => {}
        Err(e) => return failed(Stage::Check, e),
    }
    if opts.mode == Mode::Check || opts.dry_run {
        return Outcome::NonCompliant;
    }

    if let Err(e) = resource.enforce_state() {
        return failed(Stage::Enforce, e);
    }
    match resource.check_state() {
        Ok(true) => Outcome::Enforced,
        Ok(false) => Outcome::NonCompliant,
        Err(e) => failed(Stage::Check, e),
    }
}

fn symbol(outcome: &Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Valid | Outcome::Compliant => "○".dimmed(),
        Outcome::Enforced => "✓".green(),
        Outcome::NonCompliant => "⚠".yellow(),
        Outcome::Failed { .. } => "✗".red(),
    }
}

/// Print one line per resource
pub fn print_reports(reports: &[ResourceReport], verbose: bool) {
    for report in reports {
        let kind = report.resource_type.unwrap_or("unknown");
        let status = match &report.outcome {
            Outcome::Valid => "valid".normal(),
            Outcome::Compliant => "in desired state".normal(),
            Outcome::NonCompliant => "not in desired state".yellow(),
            Outcome::Enforced => "enforced".green(),
            Outcome::Failed { stage, error } => format!("{stage} failed: {error}").red(),
        };
        println!(
            "  {} {} {} {}",
            symbol(&report.outcome),
            report.id.bold(),
            format!("({kind})").dimmed(),
            status
        );

        if verbose {
            if let Some(managed) = &report.managed {
                if let Ok(json) = serde_json::to_string_pretty(managed) {
                    for line in json.lines() {
                        println!("      {}", line.dimmed());
                    }
                }
            }
        }
        if let Some(output) = report.enforcement_output.as_deref().filter(|o| !o.is_empty()) {
            for line in String::from_utf8_lossy(output).lines() {
                println!("      {} {}", "│".dimmed(), line);
            }
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary, mode: Mode) {
    println!();
    let verb = match mode {
        Mode::Validate => "validated",
        Mode::Check => "checked",
        Mode::Apply => "applied",
    };
    if summary.is_success() {
        println!("  {} Policy {} successfully!", "✓".green().bold(), verb);
    } else {
        println!("  {} Policy {} with errors", "⚠".yellow().bold(), verb);
    }

    if summary.valid > 0 {
        println!("    • {} resources valid", summary.valid);
    }
    if summary.compliant > 0 {
        println!("    • {} resources in desired state", summary.compliant);
    }
    if summary.enforced > 0 {
        println!("    • {} resources enforced", summary.enforced);
    }
    if summary.non_compliant > 0 {
        println!("    • {} resources not in desired state", summary.non_compliant);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
