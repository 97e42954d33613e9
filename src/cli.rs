use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "osconfig-agent")]
#[command(author = "OSConfig Agent Authors")]
#[command(version)]
#[command(about = "Validate, check and enforce OS policy resources", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Agent config file (TOML)
    #[arg(long, env = "OSCONFIG_AGENT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate every resource in a policy without touching the host
    Validate(PolicyArgs),

    /// Report which resources are out of their desired state
    Check(PolicyArgs),

    /// Enforce every resource that is out of its desired state
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Policy Commands
// ============================================================================

#[derive(Parser)]
pub struct PolicyArgs {
    /// Policy file (JSON)
    pub policy: PathBuf,

    /// Number of resources processed in parallel
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Dry run - validate and check only
    #[arg(short, long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "osconfig-agent",
            "-vv",
            "apply",
            "policy.json",
            "--jobs",
            "4",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.policy.policy, PathBuf::from("policy.json"));
                assert_eq!(args.policy.jobs, 4);
                assert!(args.dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_jobs_default() {
        let cli = Cli::try_parse_from(["osconfig-agent", "check", "p.json"]).unwrap();
        match cli.command {
            Command::Check(args) => assert_eq!(args.jobs, 1),
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
