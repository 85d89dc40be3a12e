//! JSON records emitted by the backend scripts.
//!
//! Both generations project their objects onto the same shape before
//! `ConvertTo-Json`, so a single decoder serves both.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{BackendError, Dependency, InstallScope, InstalledPackage, RemotePackage};
use crate::package::registry_authority;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// Decode script output that may be empty, a single object or an array.
/// `ConvertTo-Json` unwraps one-element arrays, hence the leniency.
pub(crate) fn decode_list<T: for<'de> Deserialize<'de>>(
    command: &str,
    output: &str,
) -> Result<Vec<T>, BackendError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<OneOrMany<T>>(trimmed) {
        Ok(OneOrMany::Many(items)) => Ok(items),
        Ok(OneOrMany::One(item)) => Ok(vec![item]),
        Err(e) => Err(BackendError::InvalidOutput {
            command: command.to_string(),
            details: e.to_string(),
        }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawDependency {
    pub name: String,
    #[serde(default)]
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawInstalled {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub prerelease: Option<String>,
    #[serde(default)]
    pub installed_location: Option<String>,
    #[serde(default)]
    pub repository_source_location: Option<String>,
    #[serde(default)]
    pub dependencies: Option<Vec<RawDependency>>,
}

impl RawInstalled {
    pub fn into_installed(self, home: Option<&Path>) -> InstalledPackage {
        let (version, prerelease) = split_version(&self.version, self.prerelease);
        let install_path = PathBuf::from(self.installed_location.unwrap_or_default());
        let repository_source = self
            .repository_source_location
            .filter(|s| !s.trim().is_empty());

        InstalledPackage {
            name: self.name,
            version,
            prerelease,
            scope: InstallScope::from_path(&install_path, home),
            install_path,
            source_authority: repository_source.as_deref().and_then(registry_authority),
            repository_source,
            dependencies: self
                .dependencies
                .unwrap_or_default()
                .into_iter()
                .map(|d| Dependency {
                    name: d.name,
                    version_constraint: d.version_constraint.filter(|c| !c.is_empty()),
                    is_prerelease: d.prerelease,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawRemote {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub prerelease: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

impl RawRemote {
    pub fn into_remote(self) -> RemotePackage {
        let (version, prerelease) = split_version(&self.version, self.prerelease);
        RemotePackage {
            name: self.name,
            version,
            prerelease,
            repository: self.repository,
        }
    }
}

/// PowerShellGet v2 folds the prerelease label into the version string,
/// PSResourceGet reports it separately. Normalise to the separate form.
fn split_version(version: &str, prerelease: Option<String>) -> (String, Option<String>) {
    let prerelease = prerelease.filter(|p| !p.trim().is_empty());
    match (version.split_once('-'), prerelease) {
        (Some((numeric, label)), None) => (numeric.to_string(), Some(label.to_string())),
        (Some((numeric, _)), Some(label)) => (numeric.to_string(), Some(label)),
        (None, label) => (version.to_string(), label),
    }
}

/// Pick the newest remote version; unparsable versions lose.
pub(crate) fn newest(remotes: Vec<RemotePackage>) -> Option<RemotePackage> {
    remotes.into_iter().max_by(|a, b| a.token().cmp(&b.token()))
}
