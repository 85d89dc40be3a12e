//! Scan action - determines the installed state of catalog modules.

use log::debug;

use crate::backend::{BackendError, InstallScope, InstalledPackage, ListOptions, PackageBackend};
use crate::package::ModuleDescriptor;

/// Installed state of one catalog module.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub installed: bool,
    /// Newest installed version coming from the descriptor's registry.
    pub record: Option<InstalledPackage>,
    pub scope: Option<InstallScope>,
    /// Every installed version from the descriptor's registry, newest first.
    pub versions: Vec<InstalledPackage>,
    /// Same-named modules that no package tool installed.
    pub side_loaded: Vec<InstalledPackage>,
    /// Same-named packages installed from another registry.
    pub foreign: Vec<InstalledPackage>,
}

impl ScanResult {
    pub fn local_version(&self) -> Option<String> {
        self.record.as_ref().map(InstalledPackage::full_version)
    }

    /// Installed only outside the package tools' knowledge.
    pub fn is_side_loaded_only(&self) -> bool {
        !self.installed && !self.side_loaded.is_empty()
    }
}

/// Sort newest first; versions that do not parse go last.
pub fn sort_newest_first(packages: &mut [InstalledPackage]) {
    packages.sort_by_key(|p| std::cmp::Reverse(p.token()));
}

pub struct ModuleScanner<'a> {
    backend: &'a dyn PackageBackend,
}

impl<'a> ModuleScanner<'a> {
    pub fn new(backend: &'a dyn PackageBackend) -> Self {
        Self { backend }
    }

    /// Query the backend and keep only installs from the descriptor's
    /// registry; two packages with the same name from different registries
    /// are different modules.
    #[tracing::instrument(skip(self, descriptor), fields(module = %descriptor.name))]
    pub async fn scan(&self, descriptor: &ModuleDescriptor) -> Result<ScanResult, BackendError> {
        let authority = descriptor.registry_authority();
        let records = self
            .backend
            .list_installed(
                &descriptor.name,
                ListOptions {
                    list_available: true,
                    all_scopes: true,
                },
            )
            .await?;

        let mut result = ScanResult::default();
        for record in records {
            let same_registry = record
                .source_authority
                .as_deref()
                .map(|source| Some(source) == authority.as_deref());
            match same_registry {
                None => result.side_loaded.push(record),
                Some(true) => result.versions.push(record),
                Some(false) => result.foreign.push(record),
            }
        }

        if !result.foreign.is_empty() {
            debug!(
                "{}: ignoring {} install(s) from other registries",
                descriptor.name,
                result.foreign.len()
            );
        }

        sort_newest_first(&mut result.versions);
        result.record = result.versions.first().cloned();
        result.installed = result.record.is_some();
        result.scope = result.record.as_ref().map(|r| r.scope);
        Ok(result)
    }

    /// All installed versions of `name` coming from `authority`, newest first.
    /// Used for dependency modules, which have no catalog descriptor.
    pub async fn installed_versions(
        &self,
        name: &str,
        authority: Option<&str>,
    ) -> Result<Vec<InstalledPackage>, BackendError> {
        let mut versions: Vec<InstalledPackage> = self
            .backend
            .list_installed(
                name,
                ListOptions {
                    list_available: false,
                    all_scopes: true,
                },
            )
            .await?
            .into_iter()
            .filter(|p| p.source_authority.is_some() && p.source_authority.as_deref() == authority)
            .collect();
        sort_newest_first(&mut versions);
        Ok(versions)
    }
}
