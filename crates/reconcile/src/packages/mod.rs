//! Package manager command tables.
//!
//! Everything here builds or interprets command lines; nothing decides
//! desired state. Resources pick a [`Target`] and an [`Action`] and get back
//! the [`Plan`] to run.

pub mod inspect;
pub mod list;

use crate::error::{Error, Result};
use runner::CommandSpec;
use std::fmt;
use std::path::Path;

/// `apt-get`
pub const APT_GET: &str = "apt-get";
/// `dpkg`
pub const DPKG: &str = "dpkg";
/// `dpkg-deb`
pub const DPKG_DEB: &str = "dpkg-deb";
/// `dpkg-query`
pub const DPKG_QUERY: &str = "dpkg-query";
/// `yum`
pub const YUM: &str = "yum";
/// `zypper`
pub const ZYPPER: &str = "zypper";
/// `rpm`
pub const RPM: &str = "rpm";
/// `msiexec`
pub const MSIEXEC: &str = "msiexec";
/// `powershell.exe`
pub const POWERSHELL: &str = "powershell.exe";
/// `reg`
pub const REG: &str = "reg";

/// Exit codes msiexec uses for success (plain, reboot initiated, reboot required).
pub const MSI_SUCCESS_CODES: &[i32] = &[0, 1641, 3010];

const SUCCESS: &[i32] = &[0];

/// What an enforcement does to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Install (or upgrade to) the package
    Install,
    /// Remove the package
    Remove,
}

impl Action {
    /// Lowercase verb.
    pub fn name(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A package as a package manager addresses it.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Named APT package
    Apt {
        /// Package name
        name: &'a str,
    },
    /// Local .deb file
    Deb {
        /// Artifact path
        path: &'a Path,
        /// Install through apt-get to resolve dependencies
        pull_deps: bool,
    },
    /// Named GooGet package
    GooGet {
        /// Path to `googet.exe`
        exe: &'a Path,
        /// Package name
        name: &'a str,
    },
    /// Local .msi file
    Msi {
        /// Artifact path
        path: &'a Path,
        /// Extra `KEY=value` properties
        properties: &'a [String],
    },
    /// Named Yum package
    Yum {
        /// Package name
        name: &'a str,
    },
    /// Named Zypper package
    Zypper {
        /// Package name
        name: &'a str,
    },
    /// Local .rpm file
    Rpm {
        /// Artifact path
        path: &'a Path,
        /// Install through yum or zypper to resolve dependencies
        pull_deps: bool,
        /// Whether yum exists (preferred over zypper for `pull_deps`)
        yum_available: bool,
    },
}

impl Target<'_> {
    /// Package manager family name.
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
}

/// Commands to run in order, and the exit codes each may end with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Commands, run in order until one fails
    pub commands: Vec<CommandSpec>,
    /// Exit codes counted as success
    pub success_codes: &'static [i32],
}

impl Plan {
    fn single(command: CommandSpec) -> Self {
        Self {
            commands: vec![command],
            success_codes: SUCCESS,
        }
    }
}

fn apt_get() -> CommandSpec {
    CommandSpec::new(APT_GET).env("DEBIAN_FRONTEND", "noninteractive")
}

fn yum_install() -> CommandSpec {
    CommandSpec::new(YUM).args(["install", "--assumeyes"])
}

fn zypper_install() -> CommandSpec {
    CommandSpec::new(ZYPPER).args([
        "--gpg-auto-import-keys",
        "--non-interactive",
        "install",
        "--auto-agree-with-licenses",
    ])
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Build the commands performing `action` on `target`.
///
/// Artifact packages (deb, rpm, msi) can only be installed.
pub fn plan(target: Target<'_>, action: Action) -> Result<Plan> {
    let plan = match (target, action) {
        (Target::Apt { name }, Action::Install) => Plan {
            commands: vec![
                apt_get().arg("update"),
                apt_get().args(["install", "-y", name]),
            ],
            success_codes: SUCCESS,
        },
        (Target::Apt { name }, Action::Remove) => {
            Plan::single(apt_get().args(["remove", "-y", name]))
        }
        (Target::Deb { path, pull_deps: true }, Action::Install) => {
            Plan::single(apt_get().args(["install", "-y"]).arg(display(path)))
        }
        (Target::Deb { path, pull_deps: false }, Action::Install) => {
            Plan::single(CommandSpec::new(DPKG).arg("--install").arg(display(path)))
        }
        (Target::GooGet { exe, name }, action) => Plan::single(
            CommandSpec::new(display(exe)).args(["-noconfirm", action.name(), name]),
        ),
        (Target::Msi { path, properties }, Action::Install) => Plan {
            commands: vec![
                CommandSpec::new(MSIEXEC)
                    .arg("/i")
                    .arg(display(path))
                    .args(["/qn", "/norestart"])
                    .args(properties.iter().cloned()),
            ],
            success_codes: MSI_SUCCESS_CODES,
        },
        (Target::Yum { name }, Action::Install) => Plan::single(yum_install().arg(name)),
        (Target::Yum { name }, Action::Remove) => {
            Plan::single(CommandSpec::new(YUM).args(["remove", "--assumeyes", name]))
        }
        (Target::Zypper { name }, Action::Install) => Plan::single(zypper_install().arg(name)),
        (Target::Zypper { name }, Action::Remove) => Plan::single(
            CommandSpec::new(ZYPPER).args(["--non-interactive", "remove", name]),
        ),
        (
            Target::Rpm {
                path,
                pull_deps: true,
                yum_available,
            },
            Action::Install,
        ) => {
            let base = if yum_available { yum_install() } else { zypper_install() };
            Plan::single(base.arg(display(path)))
        }
        (
            Target::Rpm {
                path,
                pull_deps: false,
                ..
            },
            Action::Install,
        ) => Plan::single(
            CommandSpec::new(RPM)
                .args(["--upgrade", "--replacepkgs", "-v"])
                .arg(display(path)),
        ),
        (target @ (Target::Deb { .. } | Target::Msi { .. } | Target::Rpm { .. }), Action::Remove) => {
            return Err(Error::Unsupported(format!(
                "{} packages can only be installed",
                target.kind()
            )));
        }
    };
    Ok(plan)
}
