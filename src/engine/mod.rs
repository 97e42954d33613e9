//! Execution engine for the agent
//!
//! Every resource of a policy is validated, checked and, when applying,
//! enforced and checked again. Resources share one [`reconcile::AgentContext`]
//! so the installed-state and package-info caches are reused across them.

pub mod executor;

pub use executor::{ExecuteOptions, ExecuteSummary, Mode, execute, print_reports, print_summary};
