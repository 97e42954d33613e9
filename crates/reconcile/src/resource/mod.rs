//! Resource variants.
//!
//! Each variant implements [`Reconcile`]; [`Handler`] is the closed set of
//! variants the dispatcher can drive.

pub mod exec;
pub mod file;
pub mod package;
pub mod repository;
mod source;

pub use exec::ExecHandler;
pub use file::{FileHandler, ManagedFile};
pub use package::{ManagedPackage, PackageHandler};
pub use repository::{ManagedGpgKey, ManagedRepository, RepositoryHandler, RepositoryKind};

use crate::context::AgentContext;
use crate::descriptor::ResourceKind;
use crate::error::Result;
use serde::Serialize;

/// What a validated resource manages on the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ManagedResources {
    /// Packages
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<ManagedPackage>,
    /// Repositories
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<ManagedRepository>,
    /// Files
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ManagedFile>,
}

/// Output an exec resource produced while enforcing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    /// Contents of the enforce step's output file
    pub enforcement_output: Vec<u8>,
}

/// Compliance details reported for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceCompliance {
    /// Exec resource output, if any
    pub exec: Option<ExecOutput>,
}

/// The validate / check / enforce lifecycle of one resource type.
pub trait Reconcile {
    /// Check the descriptor against the host and resolve what it manages.
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources>;

    /// Whether the host already matches the desired state.
    fn check_state(&mut self, ctx: &AgentContext) -> Result<bool>;

    /// Bring the host to the desired state.
    fn enforce_state(&mut self, ctx: &AgentContext) -> Result<bool>;

    /// Add resource-specific compliance details.
    fn populate_output(&self, _compliance: &mut ResourceCompliance) {}

    /// Release temporary files. Must be safe to call more than once.
    fn cleanup(&mut self) -> Result<()>;
}

/// One of the resource variants.
#[derive(Debug)]
pub enum Handler {
    /// Package resource
    Package(PackageHandler),
    /// Repository resource
    Repository(RepositoryHandler),
    /// File resource
    File(FileHandler),
    /// Exec resource
    Exec(ExecHandler),
}

impl Handler {
    /// Handler for a resource kind.
    pub fn new(kind: ResourceKind<'_>) -> Self {
        match kind {
            ResourceKind::Package(r) => Self::Package(PackageHandler::new(r.clone())),
            ResourceKind::Repository(r) => Self::Repository(RepositoryHandler::new(r.clone())),
            ResourceKind::File(r) => Self::File(FileHandler::new(r.clone())),
            ResourceKind::Exec(r) => Self::Exec(ExecHandler::new(r.clone())),
        }
    }

    /// Short name of the resource type.
    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Package(_) => "package",
            Self::Repository(_) => "repository",
            Self::File(_) => "file",
            Self::Exec(_) => "exec",
        }
    }

    fn inner(&mut self) -> &mut dyn Reconcile {
        match self {
            Self::Package(h) => h,
            Self::Repository(h) => h,
            Self::File(h) => h,
            Self::Exec(h) => h,
        }
    }
}

impl Reconcile for Handler {
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources> {
        self.inner().validate(ctx)
    }

    fn check_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        self.inner().check_state(ctx)
    }

    fn enforce_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        self.inner().enforce_state(ctx)
    }

    fn populate_output(&self, compliance: &mut ResourceCompliance) {
        match self {
            Self::Package(h) => h.populate_output(compliance),
            Self::Repository(h) => h.populate_output(compliance),
            Self::File(h) => h.populate_output(compliance),
            Self::Exec(h) => h.populate_output(compliance),
        }
    }

    fn cleanup(&mut self) -> Result<()> {
        self.inner().cleanup()
    }
}
