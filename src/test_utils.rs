//! Test doubles shared by the use case tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::application::{SessionContext, SessionOptions};
use crate::backend::{
    BackendError, BackendKind, InstallOptions, InstallScope, InstalledPackage, ListOptions,
    MockShell, PackageBackend, RemotePackage, UninstallOptions, UninstallTarget, UpdateOptions,
};
use crate::package::{Catalog, ModuleDescriptor, registry_authority};
use crate::runtime::MockRuntime;

pub const GALLERY: &str = "https://www.powershellgallery.com/api/v2";

/// A package installed from the PowerShell Gallery for all users.
pub fn gallery_package(name: &str, version: &str) -> InstalledPackage {
    package_from(name, version, Some(GALLERY))
}

pub fn package_from(name: &str, version: &str, source: Option<&str>) -> InstalledPackage {
    let (numeric, prerelease) = match version.split_once('-') {
        Some((n, p)) => (n.to_string(), Some(p.to_string())),
        None => (version.to_string(), None),
    };
    InstalledPackage {
        name: name.to_string(),
        install_path: PathBuf::from(format!(
            "/usr/local/share/powershell/Modules/{}/{}",
            name, numeric
        )),
        version: numeric,
        prerelease,
        scope: InstallScope::AllUsers,
        source_authority: source.and_then(registry_authority),
        repository_source: source.map(String::from),
        dependencies: vec![],
    }
}

pub fn catalog_of(names: &[&str]) -> Catalog {
    Catalog::from_descriptors(
        names
            .iter()
            .map(|n| ModuleDescriptor::new(n, GALLERY))
            .collect(),
    )
    .expect("valid test catalog")
}

/// In-memory package store that behaves like a package tool.
#[derive(Default)]
pub struct FakeBackend {
    installed: Mutex<Vec<InstalledPackage>>,
    remote: Mutex<HashMap<String, String>>,
    dependencies: Mutex<HashMap<String, Vec<crate::backend::Dependency>>>,
    failures: Mutex<HashMap<String, BackendError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, package: InstalledPackage) {
        self.installed.lock().unwrap().push(package);
    }

    /// Set the newest version the registry offers for `name`.
    pub fn publish(&self, name: &str, version: &str) {
        self.remote
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), version.to_string());
    }

    /// Declare dependencies attached to every version installed from now on.
    pub fn depends_on(&self, name: &str, deps: &[&str]) {
        let deps = deps
            .iter()
            .map(|d| crate::backend::Dependency {
                name: d.to_string(),
                version_constraint: None,
                is_prerelease: false,
            })
            .collect::<Vec<_>>();
        for pkg in self.installed.lock().unwrap().iter_mut() {
            if pkg.name.eq_ignore_ascii_case(name) {
                pkg.dependencies = deps.clone();
            }
        }
        self.dependencies
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), deps);
    }

    /// Make the operation `key` ("list Az", "find Az", "install Az",
    /// "update Az", "uninstall Az 1.0") fail with `error`.
    pub fn fail(&self, key: &str, error: BackendError) {
        self.failures.lock().unwrap().insert(key.to_string(), error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Mutating calls only (install, update, uninstall).
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("list ") && !c.starts_with("find "))
            .collect()
    }

    pub fn versions_of(&self, name: &str) -> Vec<String> {
        let mut versions: Vec<InstalledPackage> = self
            .installed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect();
        crate::application::sort_newest_first(&mut versions);
        versions.iter().map(InstalledPackage::full_version).collect()
    }

    fn check(&self, key: String) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(key.clone());
        match self.failures.lock().unwrap().get(&key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn install_remote(&self, name: &str, scope: InstallScope) -> Result<(), BackendError> {
        let version = self
            .remote
            .lock()
            .unwrap()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                module: name.to_string(),
            })?;
        let mut pkg = gallery_package(name, &version);
        pkg.scope = scope;
        if let Some(deps) = self.dependencies.lock().unwrap().get(&name.to_lowercase()) {
            pkg.dependencies = deps.clone();
        }
        self.add(pkg);
        Ok(())
    }
}

#[async_trait]
impl PackageBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    async fn list_installed(
        &self,
        name: &str,
        _options: ListOptions,
    ) -> Result<Vec<InstalledPackage>, BackendError> {
        self.check(format!("list {}", name))?;
        Ok(self
            .installed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        name: &str,
        _prerelease: bool,
    ) -> Result<Option<RemotePackage>, BackendError> {
        self.check(format!("find {}", name))?;
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(&name.to_lowercase())
            .map(|v| RemotePackage {
                name: name.to_string(),
                version: v.clone(),
                prerelease: None,
                repository: Some("PSGallery".into()),
            }))
    }

    async fn install(&self, name: &str, options: InstallOptions) -> Result<(), BackendError> {
        self.check(format!("install {}", name))?;
        self.install_remote(name, options.scope)
    }

    async fn update(&self, name: &str, options: UpdateOptions) -> Result<(), BackendError> {
        self.check(format!("update {}", name))?;
        self.install_remote(name, options.scope)
    }

    async fn uninstall(
        &self,
        name: &str,
        target: &UninstallTarget,
        _options: UninstallOptions,
    ) -> Result<(), BackendError> {
        match target {
            UninstallTarget::All => self.check(format!("uninstall {}", name))?,
            UninstallTarget::Version(v) => self.check(format!("uninstall {} {}", name, v))?,
        }
        self.installed.lock().unwrap().retain(|p| {
            !p.name.eq_ignore_ascii_case(name)
                || matches!(target, UninstallTarget::Version(v) if *v != p.full_version())
        });
        Ok(())
    }
}

/// Build a session context around a fake backend.
pub fn test_context(
    backend: Arc<FakeBackend>,
    catalog: Catalog,
    privileged: bool,
    other_sessions: usize,
) -> SessionContext {
    let mut runtime = MockRuntime::new();
    runtime.expect_is_privileged().returning(move || privileged);
    runtime
        .expect_home_dir()
        .returning(|| Some(PathBuf::from("/home/user")));
    runtime.expect_confirm().returning(|_| Ok(false));

    let mut shell = MockShell::new();
    shell
        .expect_host_session_count()
        .returning(move || other_sessions);

    SessionContext::new(
        Arc::new(runtime),
        Arc::new(shell),
        backend,
        catalog,
        SessionOptions::default(),
    )
}
