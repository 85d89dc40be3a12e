//! Package-backend abstraction.
//!
//! Two generations of PowerShell package tooling can be present on a
//! machine: PowerShellGet v2 (legacy) and PSResourceGet (modern). Both are
//! exposed through [`PackageBackend`]; which one is used is decided once at
//! startup by [`detect_backend`].

mod detect;
mod error;
mod legacy;
mod modern;
mod records;
pub mod shell;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use detect::{MODERN_MARKER_COMMAND, detect_backend, select_backend};
pub use error::BackendError;
pub use legacy::LegacyBackend;
pub use modern::ModernBackend;
pub use shell::{PowerShellHost, ScriptError, Shell};

#[cfg(test)]
pub use shell::MockShell;

use crate::package::{VersionToken, full_version};

/// Installation visibility of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InstallScope {
    #[default]
    CurrentUser,
    AllUsers,
}

impl InstallScope {
    /// Infer the scope from where a package lives on disk.
    ///
    /// The tools do not report scope directly; anything under the user's
    /// home directory is treated as a current-user install. This is a
    /// heuristic and can be wrong for relocated module paths.
    pub fn from_path(path: &Path, home: Option<&Path>) -> Self {
        match home {
            Some(home) if !home.as_os_str().is_empty() && path.starts_with(home) => {
                InstallScope::CurrentUser
            }
            _ => InstallScope::AllUsers,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            InstallScope::CurrentUser => InstallScope::AllUsers,
            InstallScope::AllUsers => InstallScope::CurrentUser,
        }
    }

    /// Value of the tools' `-Scope` parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            InstallScope::CurrentUser => "CurrentUser",
            InstallScope::AllUsers => "AllUsers",
        }
    }
}

impl fmt::Display for InstallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallScope::CurrentUser => write!(f, "current-user"),
            InstallScope::AllUsers => write!(f, "all-users"),
        }
    }
}

impl FromStr for InstallScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "currentuser" | "user" => Ok(InstallScope::CurrentUser),
            "allusers" | "all" | "machine" => Ok(InstallScope::AllUsers),
            _ => anyhow::bail!(
                "Unknown scope: {}. Expected current-user or all-users.",
                s
            ),
        }
    }
}

/// Which generation of package tooling a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Legacy,
    Modern,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Legacy => write!(f, "legacy"),
            BackendKind::Modern => write!(f, "modern"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" | "powershellget" => Ok(BackendKind::Legacy),
            "modern" | "psresourceget" => Ok(BackendKind::Modern),
            _ => anyhow::bail!("Unknown backend: {}. Expected legacy or modern.", s),
        }
    }
}

/// A dependency declared by an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependency {
    pub name: String,
    pub version_constraint: Option<String>,
    pub is_prerelease: bool,
}

/// One installed version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstalledPackage {
    pub name: String,
    /// Numeric version as reported by the tool, without prerelease label.
    pub version: String,
    pub prerelease: Option<String>,
    pub scope: InstallScope,
    pub install_path: PathBuf,
    /// Host part of the registry URL the package was installed from.
    /// `None` for modules that were not installed by a package tool.
    pub source_authority: Option<String>,
    pub repository_source: Option<String>,
    pub dependencies: Vec<Dependency>,
}

impl InstalledPackage {
    /// Version including the prerelease label, e.g. `3.0.0-preview3`.
    pub fn full_version(&self) -> String {
        full_version(&self.version, self.prerelease.as_deref())
    }

    pub fn token(&self) -> Option<VersionToken> {
        VersionToken::parse(&self.full_version()).ok()
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Whether the package tool knows where this package came from.
    pub fn has_provenance(&self) -> bool {
        self.source_authority.is_some()
    }
}

/// A package version available in a registry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemotePackage {
    pub name: String,
    pub version: String,
    pub prerelease: Option<String>,
    pub repository: Option<String>,
}

impl RemotePackage {
    pub fn full_version(&self) -> String {
        full_version(&self.version, self.prerelease.as_deref())
    }

    pub fn token(&self) -> Option<VersionToken> {
        VersionToken::parse(&self.full_version()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListOptions {
    /// Include modules present on the module path that were not installed
    /// by the package tool.
    pub list_available: bool,
    /// Look in both scopes rather than only the current user's.
    pub all_scopes: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstallOptions {
    pub scope: InstallScope,
    pub prerelease: bool,
    pub allow_clobber: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    pub scope: InstallScope,
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallTarget {
    All,
    Version(String),
}

impl fmt::Display for UninstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UninstallTarget::All => write!(f, "all versions"),
            UninstallTarget::Version(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UninstallOptions {
    pub prerelease: bool,
    /// Scope the version was installed in, when known.
    pub scope: Option<InstallScope>,
}

/// Uniform interface over the package tooling generations.
///
/// Update and uninstall implementations unload the module from the host
/// session before touching its files.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PackageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn list_installed(
        &self,
        name: &str,
        options: ListOptions,
    ) -> Result<Vec<InstalledPackage>, BackendError>;

    /// Newest version of `name` available in the registered registries.
    async fn find(&self, name: &str, prerelease: bool)
    -> Result<Option<RemotePackage>, BackendError>;

    async fn install(&self, name: &str, options: InstallOptions) -> Result<(), BackendError>;

    async fn update(&self, name: &str, options: UpdateOptions) -> Result<(), BackendError>;

    async fn uninstall(
        &self,
        name: &str,
        target: &UninstallTarget,
        options: UninstallOptions,
    ) -> Result<(), BackendError>;
}
