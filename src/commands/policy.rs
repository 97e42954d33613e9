//! Policy commands
//!
//! - `validate` - Resolve every resource without touching the host
//! - `check` - Report which resources are out of their desired state
//! - `apply` - Enforce what is out of state and check again

use anyhow::Result;
use reconcile::AgentContext;
use std::path::Path;
use std::sync::Arc;

use crate::Context;
use crate::config::AgentConfig;
use crate::engine::{self, ExecuteOptions, ExecuteSummary, Mode};
use crate::policy;
use crate::ui;

pub fn validate(ctx: &Context, policy: &Path, jobs: usize) -> Result<i32> {
    run(ctx, policy, Mode::Validate, false, jobs)
}

pub fn check(ctx: &Context, policy: &Path, jobs: usize) -> Result<i32> {
    run(ctx, policy, Mode::Check, false, jobs)
}

pub fn apply(ctx: &Context, policy: &Path, dry_run: bool, jobs: usize) -> Result<i32> {
    run(ctx, policy, Mode::Apply, dry_run, jobs)
}

fn run(ctx: &Context, policy_file: &Path, mode: Mode, dry_run: bool, jobs: usize) -> Result<i32> {
    let config = AgentConfig::load(ctx.config.as_deref())?;
    let resources = policy::load(policy_file)?;

    if resources.is_empty() {
        ui::warn(&format!("{} has no resources", policy_file.display()));
        return Ok(0);
    }

    if !ctx.quiet {
        ui::header(match mode {
            Mode::Validate => "Validate",
            Mode::Check => "Check",
            Mode::Apply if dry_run => "Apply (dry run)",
            Mode::Apply => "Apply",
        });
        ui::kv("Policy", &policy_file.display().to_string());
        ui::kv("Resources", &resources.len().to_string());
        ui::kv("Cache", &config.paths.cache_dir.display().to_string());
        println!();
    }

    let agent = Arc::new(AgentContext::system(config.paths));
    let opts = ExecuteOptions {
        mode,
        dry_run,
        jobs,
        quiet: ctx.quiet,
    };
    let reports = engine::execute(&agent, &resources, &opts)?;

    engine::print_reports(&reports, ctx.verbose > 0);
    let summary = ExecuteSummary::from_reports(&reports);
    if !ctx.quiet {
        engine::print_summary(&summary, mode);
    }

    Ok(summary.exit_code())
}
