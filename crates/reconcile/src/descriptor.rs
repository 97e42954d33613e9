//! Policy resource descriptors as received from the policy source.
//!
//! Descriptors keep the wire shape: a struct with one optional field per
//! alternative, of which exactly one must be set. The `*_kind` accessors
//! turn that shape into borrowed sum types, rejecting descriptors with none
//! or several alternatives populated.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One declarative unit of desired state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyResource {
    /// Resource identifier, unique within its policy
    #[serde(default)]
    pub id: String,
    /// Package resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg: Option<PackageResource>,
    /// Repository resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryResource>,
    /// File resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileResource>,
    /// Exec resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecResource>,
}

/// Borrowed view of the populated resource type.
#[derive(Debug, Clone, Copy)]
pub enum ResourceKind<'a> {
    /// Package resource
    Package(&'a PackageResource),
    /// Repository resource
    Repository(&'a RepositoryResource),
    /// File resource
    File(&'a FileResource),
    /// Exec resource
    Exec(&'a ExecResource),
}

impl PolicyResource {
    /// The single populated resource type.
    pub fn kind(&self) -> Result<ResourceKind<'_>> {
        exactly_one(
            &format!("resource {:?}", self.id),
            [
                self.pkg.as_ref().map(ResourceKind::Package),
                self.repository.as_ref().map(ResourceKind::Repository),
                self.file.as_ref().map(ResourceKind::File),
                self.exec.as_ref().map(ResourceKind::Exec),
            ],
        )
    }
}

// ============================================================================
// Packages
// ============================================================================

/// Desired state of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DesiredState {
    /// Not set
    #[default]
    DesiredStateUnspecified,
    /// Package must be installed
    Installed,
    /// Package must not be installed
    Removed,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DesiredStateUnspecified => "UNSPECIFIED",
            Self::Installed => "INSTALLED",
            Self::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

/// A package resource: desired state plus exactly one system package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PackageResource {
    /// Desired state
    #[serde(default)]
    pub desired_state: DesiredState,
    /// Package from an APT repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<NamedPackage>,
    /// Local or remote .deb file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deb: Option<ArtifactPackage>,
    /// Package from a GooGet repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub googet: Option<NamedPackage>,
    /// Local or remote .msi file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msi: Option<MsiPackage>,
    /// Package from a Yum repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yum: Option<NamedPackage>,
    /// Package from a Zypper repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zypper: Option<NamedPackage>,
    /// Local or remote .rpm file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpm: Option<ArtifactPackage>,
}

/// Package identified by name in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NamedPackage {
    /// Package name
    pub name: String,
}

/// Package installed from a .deb or .rpm artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactPackage {
    /// Where the artifact comes from
    pub source: FileSource,
    /// Resolve dependencies through the host package manager
    #[serde(default)]
    pub pull_deps: bool,
}

/// Package installed from an .msi artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MsiPackage {
    /// Where the artifact comes from
    pub source: FileSource,
    /// Extra `KEY=value` properties passed to msiexec
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<String>,
}

/// Borrowed view of the populated system package.
#[derive(Debug, Clone, Copy)]
pub enum SystemPackage<'a> {
    /// APT package
    Apt(&'a NamedPackage),
    /// Deb artifact
    Deb(&'a ArtifactPackage),
    /// GooGet package
    GooGet(&'a NamedPackage),
    /// MSI artifact
    Msi(&'a MsiPackage),
    /// Yum package
    Yum(&'a NamedPackage),
    /// Zypper package
    Zypper(&'a NamedPackage),
    /// RPM artifact
    Rpm(&'a ArtifactPackage),
}

impl PackageResource {
    /// The single populated system package.
    pub fn system_package(&self) -> Result<SystemPackage<'_>> {
        exactly_one(
            "package resource",
            [
                self.apt.as_ref().map(SystemPackage::Apt),
                self.deb.as_ref().map(SystemPackage::Deb),
                self.googet.as_ref().map(SystemPackage::GooGet),
                self.msi.as_ref().map(SystemPackage::Msi),
                self.yum.as_ref().map(SystemPackage::Yum),
                self.zypper.as_ref().map(SystemPackage::Zypper),
                self.rpm.as_ref().map(SystemPackage::Rpm),
            ],
        )
    }
}

// ============================================================================
// File sources
// ============================================================================

/// Content that lives somewhere else: a URI, an object-store object or a local path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileSource {
    /// HTTP(S) location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteFile>,
    /// Object-store location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsObject>,
    /// Path on the local filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Accept remote content without integrity pinning
    #[serde(default)]
    pub allow_insecure: bool,
}

/// HTTP(S) file with an optional expected checksum.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteFile {
    /// URI of the file
    pub uri: String,
    /// Expected sha256 (hex); empty means unchecked
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sha256_checksum: String,
}

/// Object-store object.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GcsObject {
    /// Bucket name
    pub bucket: String,
    /// Object name
    pub object: String,
    /// Object generation; unset means the live version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

/// Borrowed view of the populated file location.
#[derive(Debug, Clone, Copy)]
pub enum SourceLocation<'a> {
    /// HTTP(S)
    Remote(&'a RemoteFile),
    /// Object store
    Gcs(&'a GcsObject),
    /// Local path
    Local(&'a str),
}

impl FileSource {
    /// The single populated location.
    pub fn location(&self) -> Result<SourceLocation<'_>> {
        exactly_one(
            "file source",
            [
                self.remote.as_ref().map(SourceLocation::Remote),
                self.gcs.as_ref().map(SourceLocation::Gcs),
                self.local_path.as_deref().map(SourceLocation::Local),
            ],
        )
    }
}

// ============================================================================
// Repositories
// ============================================================================

/// A repository resource: exactly one repository family.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepositoryResource {
    /// APT repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apt: Option<AptRepository>,
    /// Yum repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yum: Option<RpmRepository>,
    /// Zypper repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zypper: Option<RpmRepository>,
    /// GooGet repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goo: Option<GooRepository>,
}

/// APT source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveType {
    /// Not set
    #[default]
    ArchiveTypeUnspecified,
    /// Binary packages (`deb`)
    Deb,
    /// Source packages (`deb-src`)
    DebSrc,
}

/// APT repository definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AptRepository {
    /// Source type
    #[serde(default)]
    pub archive_type: ArchiveType,
    /// Repository base URI
    pub uri: String,
    /// Distribution (suite) name
    pub distribution: String,
    /// Components
    #[serde(default)]
    pub components: Vec<String>,
    /// URI of the signing key; empty for none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gpg_key: String,
}

/// Yum or Zypper repository definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RpmRepository {
    /// Repository id (section name)
    pub id: String,
    /// Human-readable name; defaults to the id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    /// Base URL
    pub base_url: String,
    /// Signing key URLs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gpg_keys: Vec<String>,
}

/// GooGet repository definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GooRepository {
    /// Repository name
    pub name: String,
    /// Repository URL
    pub url: String,
}

/// Borrowed view of the populated repository family.
#[derive(Debug, Clone, Copy)]
pub enum RepositoryFamily<'a> {
    /// APT
    Apt(&'a AptRepository),
    /// Yum
    Yum(&'a RpmRepository),
    /// Zypper
    Zypper(&'a RpmRepository),
    /// GooGet
    GooGet(&'a GooRepository),
}

impl RepositoryResource {
    /// The single populated repository family.
    pub fn family(&self) -> Result<RepositoryFamily<'_>> {
        exactly_one(
            "repository resource",
            [
                self.apt.as_ref().map(RepositoryFamily::Apt),
                self.yum.as_ref().map(RepositoryFamily::Yum),
                self.zypper.as_ref().map(RepositoryFamily::Zypper),
                self.goo.as_ref().map(RepositoryFamily::GooGet),
            ],
        )
    }
}

// ============================================================================
// Files
// ============================================================================

/// Desired state of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    /// Not set
    #[default]
    DesiredStateUnspecified,
    /// File must exist (content not checked)
    Present,
    /// File must not exist
    Absent,
    /// File must exist with exactly the given content
    ContentsMatch,
}

/// A file resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileResource {
    /// Target path
    pub path: String,
    /// Desired state
    #[serde(default)]
    pub state: FileState,
    /// Inline content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content from elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSource>,
    /// Octal permission bits, e.g. "0644"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub permissions: String,
}

// ============================================================================
// Exec
// ============================================================================

/// Interpreter used to run an exec step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Interpreter {
    /// Execute the file directly
    #[default]
    None,
    /// `/bin/sh` on Unix, direct execution on Windows
    Shell,
    /// PowerShell (Windows only)
    Powershell,
}

/// One exec step: a script or a file plus how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecSpec {
    /// Inline script text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Executable from elsewhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSource>,
    /// Extra arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Interpreter selector
    #[serde(default)]
    pub interpreter: Interpreter,
    /// File the step may write its output to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_file_path: String,
}

/// An exec resource: a validate step and an optional enforce step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResource {
    /// Step deciding compliance (exit 100 compliant, 101 not)
    pub validate: ExecSpec,
    /// Step bringing the host into compliance (exit 100 on success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce: Option<ExecSpec>,
}

/// Pick the only populated alternative out of `candidates`.
fn exactly_one<T>(what: &str, candidates: impl IntoIterator<Item = Option<T>>) -> Result<T> {
    let mut set = candidates.into_iter().flatten();
    match (set.next(), set.next()) {
        (Some(only), None) => Ok(only),
        (None, _) => Err(Error::invalid(format!("{what} has no type set"))),
        (Some(_), Some(_)) => Err(Error::invalid(format!("{what} has more than one type set"))),
    }
}
