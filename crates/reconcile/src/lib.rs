//! # reconcile
//!
//! OS policy resource reconciliation.
//!
//! A policy resource declares desired state for a package, a repository, a
//! file or a pair of validate/enforce scripts. This crate checks that
//! declaration against the host and, when asked, converges the host to it.
//!
//! ## Core Concepts
//!
//! - **Descriptor**: a [`PolicyResource`] as received from the policy source
//! - **Handler**: the variant that knows how to validate, check and enforce
//!   one resource type ([`resource::Reconcile`])
//! - **Dispatcher**: [`OsPolicyResource`], which picks the variant and
//!   enforces the validate-first ordering
//! - **Context**: [`AgentContext`], holding the command runner, the
//!   fetcher and the caches shared by every resource in a cycle
//!
//! ## Example
//!
//! ```no_run
//! use reconcile::{AgentContext, AgentPaths, OsPolicyResource, PolicyResource};
//! use std::sync::Arc;
//!
//! let ctx = Arc::new(AgentContext::system(AgentPaths::default()));
//! let descriptor: PolicyResource = serde_json::from_str(
//!     r#"{"id": "curl", "pkg": {"desired_state": "INSTALLED", "apt": {"name": "curl"}}}"#,
//! ).unwrap();
//!
//! let mut resource = OsPolicyResource::new(ctx);
//! resource.validate(&descriptor).unwrap();
//! if !resource.check_state().unwrap() {
//!     resource.enforce_state().unwrap();
//! }
//! resource.cleanup().unwrap();
//! ```
//!
//! ## Caching
//!
//! Two caches live in the context. [`cache::InstalledCache`] keeps the list
//! of installed packages per package manager for three minutes and is
//! invalidated before any install or remove. [`cache::PackageInfoCache`]
//! persists metadata inspected from package artifacts so a .deb, .rpm or
//! .msi is not downloaded and inspected again on every cycle.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod gpg;
pub mod packages;
pub mod resource;

pub use config::AgentPaths;
pub use context::{AgentContext, Platform};
pub use descriptor::PolicyResource;
pub use dispatcher::OsPolicyResource;
pub use error::{Error, ErrorCategory, Result};
pub use resource::{
    ExecOutput, ManagedFile, ManagedPackage, ManagedRepository, ManagedResources,
    ResourceCompliance,
};
