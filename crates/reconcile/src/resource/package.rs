//! Package resources.

use super::source::{LocalCopy, localize, remove_working_dir, working_dir};
use super::{ManagedResources, Reconcile};
use crate::cache::{Manager, PackageInfo, key_for};
use crate::context::AgentContext;
use crate::descriptor::{DesiredState, FileSource, PackageResource, SystemPackage};
use crate::error::{Error, Result};
use crate::packages::{self, Action, Target, inspect, list};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tempfile::TempDir;

/// Artifact formats installed from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// .deb
    Deb,
    /// .rpm
    Rpm,
    /// .msi
    Msi,
}

impl ArtifactKind {
    fn name(self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::Rpm => "rpm",
            Self::Msi => "msi",
        }
    }
}

/// A validated package, one variant per manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "manager", rename_all = "lowercase")]
pub enum ManagedPackage {
    /// APT package
    Apt {
        /// Package name
        name: String,
        /// Desired state
        desired_state: DesiredState,
    },
    /// .deb artifact
    Deb {
        /// Where the artifact comes from
        source: FileSource,
        /// Install through apt-get
        pull_deps: bool,
        /// Local copy; `None` until needed when metadata came from the cache
        local_path: Option<PathBuf>,
        /// Inspected metadata
        info: PackageInfo,
    },
    /// GooGet package
    GooGet {
        /// Package name
        name: String,
        /// Desired state
        desired_state: DesiredState,
    },
    /// .msi artifact
    Msi {
        /// Where the artifact comes from
        source: FileSource,
        /// Extra msiexec properties
        properties: Vec<String>,
        /// Local copy; `None` until needed when metadata came from the cache
        local_path: Option<PathBuf>,
        /// Inspected metadata, including the product code
        info: PackageInfo,
    },
    /// Yum package
    Yum {
        /// Package name
        name: String,
        /// Desired state
        desired_state: DesiredState,
    },
    /// Zypper package
    Zypper {
        /// Package name
        name: String,
        /// Desired state
        desired_state: DesiredState,
    },
    /// .rpm artifact
    Rpm {
        /// Where the artifact comes from
        source: FileSource,
        /// Install through yum or zypper
        pull_deps: bool,
        /// Local copy; `None` until needed when metadata came from the cache
        local_path: Option<PathBuf>,
        /// Inspected metadata
        info: PackageInfo,
    },
}

impl ManagedPackage {
    /// Desired state (artifacts are always installed).
    pub fn desired_state(&self) -> DesiredState {
        match self {
            Self::Apt { desired_state, .. }
            | Self::GooGet { desired_state, .. }
            | Self::Yum { desired_state, .. }
            | Self::Zypper { desired_state, .. } => *desired_state,
            Self::Deb { .. } | Self::Msi { .. } | Self::Rpm { .. } => DesiredState::Installed,
        }
    }

    /// Package name as its manager knows it.
    pub fn name(&self) -> &str {
        match self {
            Self::Apt { name, .. }
            | Self::GooGet { name, .. }
            | Self::Yum { name, .. }
            | Self::Zypper { name, .. } => name,
            Self::Deb { info, .. } | Self::Msi { info, .. } | Self::Rpm { info, .. } => &info.name,
        }
    }

    /// Manager family name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Apt { .. } => "apt",
            Self::Deb { .. } => "deb",
            Self::GooGet { .. } => "googet",
            Self::Msi { .. } => "msi",
            Self::Yum { .. } => "yum",
            Self::Zypper { .. } => "zypper",
            Self::Rpm { .. } => "rpm",
        }
    }

    /// Installed-state cache slot; MSI is queried per product instead.
    pub fn manager(&self) -> Option<Manager> {
        match self {
            Self::Apt { .. } => Some(Manager::Apt),
            Self::Deb { .. } => Some(Manager::Deb),
            Self::GooGet { .. } => Some(Manager::GooGet),
            Self::Yum { .. } => Some(Manager::Yum),
            Self::Zypper { .. } => Some(Manager::Zypper),
            Self::Rpm { .. } => Some(Manager::Rpm),
            Self::Msi { .. } => None,
        }
    }
}

/// List installed packages for the database `manager` reads.
fn list_installed(ctx: &AgentContext, manager: Manager) -> Result<HashSet<String>> {
    let runner = ctx.runner.as_ref();
    match manager {
        Manager::Apt | Manager::Deb => list::dpkg_installed(runner),
        Manager::Yum | Manager::Zypper | Manager::Rpm => list::rpm_installed(runner),
        Manager::GooGet => list::googet_installed(runner, &ctx.paths.googet_exe()),
    }
}

fn require_tool(ctx: &AgentContext, resource: &str, tool: &str) -> Result<()> {
    if ctx.runner.exists(tool) {
        Ok(())
    } else {
        Err(Error::ManagerNotFound {
            resource: resource.to_string(),
            tool: tool.to_string(),
        })
    }
}

/// Package resource handler.
#[derive(Debug)]
pub struct PackageHandler {
    resource: PackageResource,
    managed: Option<ManagedPackage>,
    temp_dir: Option<TempDir>,
}

impl PackageHandler {
    /// Handler for `resource`.
    pub fn new(resource: PackageResource) -> Self {
        Self {
            resource,
            managed: None,
            temp_dir: None,
        }
    }

    /// The validated package, once validation succeeded.
    pub fn managed(&self) -> Option<&ManagedPackage> {
        self.managed.as_ref()
    }

    fn named(
        &self,
        ctx: &AgentContext,
        kind: &str,
        name: &str,
        tool: &str,
    ) -> Result<String> {
        if name.is_empty() {
            return Err(Error::invalid(format!("{kind} package has no name")));
        }
        require_tool(ctx, &format!("{kind} package {name:?}"), tool)?;
        Ok(name.to_string())
    }

    /// Resolve and inspect an artifact, consulting the package-info cache.
    fn artifact(
        &mut self,
        ctx: &AgentContext,
        kind: ArtifactKind,
        source: &FileSource,
    ) -> Result<(Option<PathBuf>, PackageInfo)> {
        if self.resource.desired_state != DesiredState::Installed {
            return Err(Error::invalid(format!(
                "desired_state {} is not supported for {} packages, only INSTALLED",
                self.resource.desired_state,
                kind.name()
            )));
        }

        let key = key_for(source)?;
        if let Some(info) = ctx.package_info.get(&key)? {
            // Remote artifacts are only downloaded if enforcement needs them.
            let local = match source.local_path {
                Some(_) => Some(self.localize(ctx, kind, source)?.path),
                None => None,
            };
            return Ok((local, info));
        }

        let copy = self.localize(ctx, kind, source)?;
        let runner = ctx.runner.as_ref();
        let info = match kind {
            ArtifactKind::Deb => inspect::deb_info(runner, &copy.path)?,
            ArtifactKind::Rpm => inspect::rpm_info(runner, &copy.path)?,
            ArtifactKind::Msi => inspect::msi_info(runner, &copy.path)?,
        };
        log::debug!(
            "Inspected {} {} {} {}",
            kind.name(),
            info.name,
            info.arch,
            info.version
        );
        ctx.package_info.insert(key, info.clone())?;
        Ok((Some(copy.path), info))
    }

    fn localize(
        &mut self,
        ctx: &AgentContext,
        kind: ArtifactKind,
        source: &FileSource,
    ) -> Result<LocalCopy> {
        let dir = working_dir(&mut self.temp_dir)?.to_path_buf();
        localize(ctx, source, &dir, &format!("pkg.{}", kind.name()))
    }
}

impl Reconcile for PackageHandler {
    fn validate(&mut self, ctx: &AgentContext) -> Result<ManagedResources> {
        let resource = self.resource.clone();
        let desired_state = resource.desired_state;
        if desired_state == DesiredState::DesiredStateUnspecified {
            return Err(Error::invalid("package desired_state must be set"));
        }

        let managed = match resource.system_package()? {
            SystemPackage::Apt(p) => ManagedPackage::Apt {
                name: self.named(ctx, "apt", &p.name, packages::APT_GET)?,
                desired_state,
            },
            SystemPackage::GooGet(p) => {
                let exe = ctx.paths.googet_exe().display().to_string();
                ManagedPackage::GooGet {
                    name: self.named(ctx, "googet", &p.name, &exe)?,
                    desired_state,
                }
            }
            SystemPackage::Yum(p) => ManagedPackage::Yum {
                name: self.named(ctx, "yum", &p.name, packages::YUM)?,
                desired_state,
            },
            SystemPackage::Zypper(p) => ManagedPackage::Zypper {
                name: self.named(ctx, "zypper", &p.name, packages::ZYPPER)?,
                desired_state,
            },
            SystemPackage::Deb(p) => {
                require_tool(ctx, "deb package", packages::DPKG)?;
                if p.pull_deps {
                    require_tool(ctx, "deb package with pull_deps", packages::APT_GET)?;
                }
                let (local_path, info) = self.artifact(ctx, ArtifactKind::Deb, &p.source)?;
                ManagedPackage::Deb {
                    source: p.source.clone(),
                    pull_deps: p.pull_deps,
                    local_path,
                    info,
                }
            }
            SystemPackage::Rpm(p) => {
                require_tool(ctx, "rpm package", packages::RPM)?;
                if p.pull_deps
                    && !ctx.runner.exists(packages::YUM)
                    && !ctx.runner.exists(packages::ZYPPER)
                {
                    return Err(Error::ManagerNotFound {
                        resource: "rpm package with pull_deps".into(),
                        tool: "yum or zypper".into(),
                    });
                }
                let (local_path, info) = self.artifact(ctx, ArtifactKind::Rpm, &p.source)?;
                ManagedPackage::Rpm {
                    source: p.source.clone(),
                    pull_deps: p.pull_deps,
                    local_path,
                    info,
                }
            }
            SystemPackage::Msi(p) => {
                if !ctx.platform.is_windows() {
                    return Err(Error::Unsupported(
                        "msi packages can only be managed on Windows".into(),
                    ));
                }
                require_tool(ctx, "msi package", packages::MSIEXEC)?;
                let (local_path, info) = self.artifact(ctx, ArtifactKind::Msi, &p.source)?;
                ManagedPackage::Msi {
                    source: p.source.clone(),
                    properties: p.properties.clone(),
                    local_path,
                    info,
                }
            }
        };

        self.managed = Some(managed.clone());
        Ok(ManagedResources {
            packages: vec![managed],
            ..Default::default()
        })
    }

    fn check_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        let managed = self
            .managed
            .as_ref()
            .ok_or(Error::NotValidated {
                operation: "check_state",
            })?;

        let installed = match (managed, managed.manager()) {
            (ManagedPackage::Msi { info, .. }, _) => {
                list::msi_installed(ctx.runner.as_ref(), &info.product_code)?
            }
            (_, Some(manager)) => ctx
                .installed
                .is_installed(manager, managed.name(), || list_installed(ctx, manager))?,
            (_, None) => false,
        };

        Ok(match managed.desired_state() {
            DesiredState::Installed => installed,
            DesiredState::Removed => !installed,
            DesiredState::DesiredStateUnspecified => false,
        })
    }

    fn enforce_state(&mut self, ctx: &AgentContext) -> Result<bool> {
        let Some(mut managed) = self.managed.take() else {
            return Err(Error::NotValidated {
                operation: "enforce_state",
            });
        };
        let result = self.enforce(ctx, &mut managed);
        self.managed = Some(managed);
        result
    }

    fn cleanup(&mut self) -> Result<()> {
        remove_working_dir(&mut self.temp_dir)
    }
}

impl PackageHandler {
    fn enforce(&mut self, ctx: &AgentContext, managed: &mut ManagedPackage) -> Result<bool> {
        let action = match managed.desired_state() {
            DesiredState::Removed => Action::Remove,
            _ => Action::Install,
        };

        // Artifacts whose metadata came from the cache are fetched now.
        match managed {
            ManagedPackage::Deb {
                source, local_path, ..
            } if local_path.is_none() => {
                *local_path = Some(self.localize(ctx, ArtifactKind::Deb, source)?.path);
            }
            ManagedPackage::Rpm {
                source, local_path, ..
            } if local_path.is_none() => {
                *local_path = Some(self.localize(ctx, ArtifactKind::Rpm, source)?.path);
            }
            ManagedPackage::Msi {
                source, local_path, ..
            } if local_path.is_none() => {
                *local_path = Some(self.localize(ctx, ArtifactKind::Msi, source)?.path);
            }
            _ => {}
        }

        if let Some(manager) = managed.manager() {
            ctx.installed.invalidate(manager);
        }

        let googet = ctx.paths.googet_exe();
        let target = match &*managed {
            ManagedPackage::Apt { name, .. } => Target::Apt { name },
            ManagedPackage::GooGet { name, .. } => Target::GooGet { exe: &googet, name },
            ManagedPackage::Yum { name, .. } => Target::Yum { name },
            ManagedPackage::Zypper { name, .. } => Target::Zypper { name },
            ManagedPackage::Deb {
                local_path: Some(path),
                pull_deps,
                ..
            } => Target::Deb {
                path,
                pull_deps: *pull_deps,
            },
            ManagedPackage::Rpm {
                local_path: Some(path),
                pull_deps,
                ..
            } => Target::Rpm {
                path,
                pull_deps: *pull_deps,
                yum_available: ctx.runner.exists(packages::YUM),
            },
            ManagedPackage::Msi {
                local_path: Some(path),
                properties,
                ..
            } => Target::Msi { path, properties },
            ManagedPackage::Deb { .. } | ManagedPackage::Rpm { .. } | ManagedPackage::Msi { .. } => {
                return Err(Error::invalid(format!(
                    "{} package has no local artifact",
                    managed.kind()
                )));
            }
        };

        let plan = packages::plan(target, action)?;
        let package = match &*managed {
            ManagedPackage::Deb { local_path, .. }
            | ManagedPackage::Rpm { local_path, .. }
            | ManagedPackage::Msi { local_path, .. } => local_path
                .as_ref()
                .map_or_else(|| managed.name().to_string(), |p| p.display().to_string()),
            other => other.name().to_string(),
        };
        log::info!("Running {} for {} package {}", action, managed.kind(), package);

        for command in &plan.commands {
            let wrap = |source| Error::Enforce {
                action: action.name(),
                kind: managed.kind(),
                package: package.clone(),
                source,
            };
            let output = ctx.runner.run(command).map_err(wrap)?;
            output
                .ensure_code(command, plan.success_codes)
                .map_err(wrap)?;
        }
        Ok(true)
    }
}
