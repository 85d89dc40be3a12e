//! Select action - interactive choice of which catalog modules to keep.
//!
//! The selector is a small state machine over a grid of catalog entries.
//! It has no terminal knowledge; the command layer feeds it
//! [`SelectorInput`]s and renders it.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use log::{debug, info};

use super::SessionContext;
use super::outcome::{ActionOutcome, BatchReport, OutcomeKind};
use super::scan::{ModuleScanner, ScanResult};
use super::update::ensure_privileged;
use crate::backend::{
    InstallOptions, InstallScope, InstalledPackage, PackageBackend, UninstallOptions,
    UninstallTarget,
};
use crate::package::Catalog;

/// Live scan results keyed by lowercased module name. Modules whose scan
/// failed are absent.
pub type InstalledMap = HashMap<String, ScanResult>;

/// Scan every catalog module. A module that cannot be scanned is logged and
/// left out, so the selector never acts on it.
#[tracing::instrument(skip(ctx))]
pub async fn scan_catalog(ctx: &SessionContext) -> InstalledMap {
    let scanner = ModuleScanner::new(ctx.backend.as_ref());
    let mut map = InstalledMap::new();
    for descriptor in ctx.catalog.descriptors() {
        match scanner.scan(descriptor).await {
            Ok(scan) => {
                map.insert(descriptor.name.to_lowercase(), scan);
            }
            Err(e) => info!("Could not scan {}: {}", descriptor.name, e),
        }
    }
    map
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    pub name: String,
    pub desired: bool,
}

/// Desired-installed flag per catalog module, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    entries: Vec<SelectionEntry>,
}

impl SelectionState {
    pub fn new(entries: Vec<SelectionEntry>) -> Self {
        Self { entries }
    }

    /// Start from what is installed right now.
    pub fn from_installed(catalog: &Catalog, installed: &InstalledMap) -> Self {
        let entries = catalog
            .descriptors()
            .iter()
            .map(|d| SelectionEntry {
                name: d.name.clone(),
                desired: installed
                    .get(&d.name.to_lowercase())
                    .is_some_and(|scan| scan.installed),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn toggle(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.desired = !entry.desired;
        }
    }

    pub fn desired(&self, name: &str) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
            .map(|e| e.desired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorState {
    Browsing,
    Committed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorInput {
    Up,
    Down,
    Left,
    Right,
    ToggleSelection,
    ToggleScope,
    Commit,
    Cancel,
}

/// Modules to install and to uninstall, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPlan {
    pub install: Vec<String>,
    pub uninstall: Vec<String>,
}

impl BatchPlan {
    /// Compare the desired flags with live scan results.
    pub fn diff(selection: &SelectionState, installed: &InstalledMap) -> Self {
        let mut plan = BatchPlan::default();
        for entry in selection.entries() {
            let Some(scan) = installed.get(&entry.name.to_lowercase()) else {
                debug!("{} has no scan result, leaving it alone", entry.name);
                continue;
            };
            match (entry.desired, scan.installed) {
                (true, false) => plan.install.push(entry.name.clone()),
                (false, true) => plan.uninstall.push(entry.name.clone()),
                _ => {}
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.install.is_empty() && self.uninstall.is_empty()
    }
}

pub struct Selector {
    selection: SelectionState,
    focus: usize,
    columns: usize,
    scope: InstallScope,
    state: SelectorState,
}

impl Selector {
    pub fn new(selection: SelectionState, columns: usize, scope: InstallScope) -> Self {
        Self {
            selection,
            focus: 0,
            columns: columns.max(1),
            scope,
            state: SelectorState::Browsing,
        }
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn scope(&self) -> InstallScope {
        self.scope
    }

    pub fn state(&self) -> SelectorState {
        self.state
    }

    /// Apply one input. Inputs after a terminal state are ignored.
    pub fn apply(&mut self, input: SelectorInput) -> SelectorState {
        if self.state != SelectorState::Browsing {
            return self.state;
        }

        let len = self.selection.len();
        match input {
            SelectorInput::Up => {
                if self.focus >= self.columns {
                    self.focus -= self.columns;
                }
            }
            SelectorInput::Down => {
                if self.focus + self.columns < len {
                    self.focus += self.columns;
                }
            }
            SelectorInput::Left => {
                if self.focus % self.columns > 0 {
                    self.focus -= 1;
                }
            }
            SelectorInput::Right => {
                if self.focus % self.columns + 1 < self.columns && self.focus + 1 < len {
                    self.focus += 1;
                }
            }
            SelectorInput::ToggleSelection => self.selection.toggle(self.focus),
            SelectorInput::ToggleScope => self.scope = self.scope.toggled(),
            SelectorInput::Commit => self.state = SelectorState::Committed,
            SelectorInput::Cancel => self.state = SelectorState::Cancelled,
        }
        self.state
    }

    /// The work a commit implies. Empty unless the selector was committed.
    pub fn plan(&self, installed: &InstalledMap) -> BatchPlan {
        match self.state {
            SelectorState::Committed => BatchPlan::diff(&self.selection, installed),
            _ => BatchPlan::default(),
        }
    }
}

/// Run a committed plan: installs first, then uninstalls. Each uninstall
/// removes the module's declared dependencies before the module itself.
/// Only versions from the catalog registry are removed; same-named packages
/// from other registries stay installed.
#[tracing::instrument(skip(ctx, plan, out))]
pub async fn execute(
    ctx: &SessionContext,
    plan: &BatchPlan,
    scope: InstallScope,
    out: &mut dyn Write,
) -> Result<BatchReport> {
    let mut report = BatchReport::new();
    if plan.is_empty() {
        return Ok(report);
    }
    if scope == InstallScope::AllUsers {
        ensure_privileged(ctx, "changing all-users modules")?;
    }

    let backend = ctx.backend.as_ref();
    let scanner = ModuleScanner::new(backend);

    for name in &plan.install {
        let options = InstallOptions {
            scope,
            prerelease: ctx.options.allow_prerelease,
            allow_clobber: true,
        };
        info!("Installing {} for {}", name, scope);
        let outcome = match backend.install(name, options).await {
            Ok(()) => {
                let version = match ctx.catalog.get(name) {
                    Some(descriptor) => scanner
                        .scan(descriptor)
                        .await
                        .ok()
                        .and_then(|scan| scan.local_version()),
                    None => None,
                };
                ActionOutcome::new(OutcomeKind::Installed, name, version)
            }
            Err(e) => ActionOutcome::from_error(name, None, &e),
        };
        report.record(outcome, out)?;
    }

    for name in &plan.uninstall {
        let Some(descriptor) = ctx.catalog.get(name) else {
            debug!("{} is not in the catalog, leaving it alone", name);
            continue;
        };
        let scan = match scanner.scan(descriptor).await {
            Ok(scan) => scan,
            Err(e) => {
                report.record(ActionOutcome::from_error(name, None, &e), out)?;
                continue;
            }
        };
        let authority = descriptor.registry_authority();

        let dependencies = scan
            .record
            .iter()
            .flat_map(|r| r.dependencies.iter())
            .filter(|d| !d.name.eq_ignore_ascii_case(name));
        for dependency in dependencies {
            match scanner
                .installed_versions(&dependency.name, authority.as_deref())
                .await
            {
                Ok(versions) => {
                    uninstall_versions(backend, &dependency.name, &versions, &mut report, out)
                        .await?
                }
                Err(e) => {
                    report.record(ActionOutcome::from_error(&dependency.name, None, &e), out)?
                }
            }
        }

        if !scan.foreign.is_empty() {
            info!(
                "Keeping {} install(s) of {} from other registries",
                scan.foreign.len(),
                name
            );
        }
        uninstall_versions(backend, name, &scan.versions, &mut report, out).await?;
    }

    Ok(report)
}

/// Uninstall exactly the given versions, each in the scope it was installed in.
async fn uninstall_versions(
    backend: &dyn PackageBackend,
    name: &str,
    versions: &[InstalledPackage],
    report: &mut BatchReport,
    out: &mut dyn Write,
) -> Result<()> {
    for package in versions {
        let version = package.full_version();
        let options = UninstallOptions {
            prerelease: package.is_prerelease(),
            scope: Some(package.scope),
        };
        let target = UninstallTarget::Version(version.clone());
        let outcome = match backend.uninstall(name, &target, options).await {
            Ok(()) => ActionOutcome::new(OutcomeKind::Uninstalled, name, Some(version)),
            Err(e) => ActionOutcome::from_error(name, Some(version), &e),
        };
        report.record(outcome, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::test_utils::{FakeBackend, catalog_of, gallery_package, package_from, test_context};
    use std::sync::Arc;

    fn selection(flags: &[(&str, bool)]) -> SelectionState {
        SelectionState::new(
            flags
                .iter()
                .map(|(name, desired)| SelectionEntry {
                    name: name.to_string(),
                    desired: *desired,
                })
                .collect(),
        )
    }

    fn grid(len: usize, columns: usize) -> Selector {
        let names: Vec<String> = (0..len).map(|i| format!("M{}", i)).collect();
        let flags: Vec<(&str, bool)> = names.iter().map(|n| (n.as_str(), false)).collect();
        Selector::new(selection(&flags), columns, InstallScope::CurrentUser)
    }

    #[test]
    fn test_navigation_clamps_at_edges() {
        // 3 columns, 7 entries:
        // 0 1 2
        // 3 4 5
        // 6
        let mut s = grid(7, 3);
        s.apply(SelectorInput::Up);
        s.apply(SelectorInput::Left);
        assert_eq!(s.focus(), 0);

        s.apply(SelectorInput::Right);
        s.apply(SelectorInput::Right);
        s.apply(SelectorInput::Right);
        assert_eq!(s.focus(), 2);

        s.apply(SelectorInput::Down);
        assert_eq!(s.focus(), 5);
        s.apply(SelectorInput::Down);
        assert_eq!(s.focus(), 5);

        s.apply(SelectorInput::Left);
        s.apply(SelectorInput::Left);
        s.apply(SelectorInput::Down);
        assert_eq!(s.focus(), 6);
        s.apply(SelectorInput::Right);
        assert_eq!(s.focus(), 6);
    }

    #[test]
    fn test_toggles() {
        let mut s = grid(4, 2);
        s.apply(SelectorInput::Right);
        s.apply(SelectorInput::ToggleSelection);
        assert_eq!(s.selection().desired("M1"), Some(true));
        assert_eq!(s.selection().desired("M0"), Some(false));

        s.apply(SelectorInput::ToggleScope);
        assert_eq!(s.scope(), InstallScope::AllUsers);
    }

    #[test]
    fn test_terminal_states_ignore_input() {
        let mut s = grid(4, 2);
        assert_eq!(s.apply(SelectorInput::Cancel), SelectorState::Cancelled);
        assert_eq!(s.apply(SelectorInput::ToggleSelection), SelectorState::Cancelled);
        assert_eq!(s.selection().desired("M0"), Some(false));
    }

    #[tokio::test]
    async fn test_commit_plans_install_and_uninstall() {
        let backend = Arc::new(FakeBackend::new());
        backend.add(gallery_package("B", "1.0"));
        backend.publish("A", "2.0");
        let ctx = test_context(backend.clone(), catalog_of(&["A", "B"]), false, 0);

        let installed = scan_catalog(&ctx).await;
        let mut s = Selector::new(
            selection(&[("A", true), ("B", false)]),
            2,
            InstallScope::CurrentUser,
        );
        s.apply(SelectorInput::Commit);
        let plan = s.plan(&installed);

        assert_eq!(plan.install, vec!["A"]);
        assert_eq!(plan.uninstall, vec!["B"]);

        let mut out = Vec::new();
        let report = execute(&ctx, &plan, s.scope(), &mut out).await.unwrap();
        assert_eq!(backend.mutations(), vec!["install A", "uninstall B 1.0"]);
        assert_eq!(report.of(OutcomeKind::Installed, "A")[0].version.as_deref(), Some("2.0"));
        assert!(backend.versions_of("B").is_empty());
    }

    #[tokio::test]
    async fn test_cancel_has_no_effect() {
        let backend = Arc::new(FakeBackend::new());
        backend.add(gallery_package("B", "1.0"));
        let ctx = test_context(backend.clone(), catalog_of(&["A", "B"]), false, 0);

        let installed = scan_catalog(&ctx).await;
        let mut s = Selector::new(
            selection(&[("A", true), ("B", false)]),
            2,
            InstallScope::CurrentUser,
        );
        s.apply(SelectorInput::Cancel);
        let plan = s.plan(&installed);
        assert!(plan.is_empty());

        let mut out = Vec::new();
        execute(&ctx, &plan, s.scope(), &mut out).await.unwrap();
        assert!(backend.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_removes_dependencies_then_module() {
        let backend = Arc::new(FakeBackend::new());
        backend.add(gallery_package("Microsoft.Graph", "2.0"));
        backend.add(gallery_package("Microsoft.Graph.Authentication", "2.0"));
        backend.depends_on("Microsoft.Graph", &["Microsoft.Graph.Authentication"]);
        backend.fail(
            "uninstall Microsoft.Graph.Authentication 2.0",
            BackendError::InUse { module: "Microsoft.Graph.Authentication".into() },
        );
        let ctx = test_context(backend.clone(), catalog_of(&["Microsoft.Graph"]), false, 0);

        let plan = BatchPlan {
            install: vec![],
            uninstall: vec!["Microsoft.Graph".into()],
        };
        let mut out = Vec::new();
        let report = execute(&ctx, &plan, InstallScope::CurrentUser, &mut out)
            .await
            .unwrap();

        assert_eq!(
            backend.mutations(),
            vec![
                "uninstall Microsoft.Graph.Authentication 2.0",
                "uninstall Microsoft.Graph 2.0"
            ]
        );
        assert_eq!(report.count(OutcomeKind::Warning), 1);
        assert_eq!(report.of(OutcomeKind::Uninstalled, "Microsoft.Graph").len(), 1);
    }

    #[tokio::test]
    async fn test_uninstall_keeps_other_registry_installs() {
        let backend = Arc::new(FakeBackend::new());
        backend.add(gallery_package("B", "1.0"));
        backend.add(gallery_package("B", "1.1-preview2"));
        backend.add(package_from("B", "9.0", Some("https://www.poshtestgallery.com/api/v2")));
        let mut ctx = test_context(backend.clone(), catalog_of(&["B"]), false, 0);
        ctx.options.allow_prerelease = true;

        let plan = BatchPlan {
            install: vec![],
            uninstall: vec!["B".into()],
        };
        let mut out = Vec::new();
        let report = execute(&ctx, &plan, InstallScope::CurrentUser, &mut out)
            .await
            .unwrap();

        assert_eq!(
            backend.mutations(),
            vec!["uninstall B 1.1-preview2", "uninstall B 1.0"]
        );
        assert_eq!(report.count(OutcomeKind::Uninstalled), 2);
        assert_eq!(backend.versions_of("B"), vec!["9.0"]);
    }

    #[tokio::test]
    async fn test_install_failure_continues() {
        let backend = Arc::new(FakeBackend::new());
        backend.publish("B", "1.0");
        let ctx = test_context(backend.clone(), catalog_of(&["A", "B"]), false, 0);

        let plan = BatchPlan {
            install: vec!["A".into(), "B".into()],
            uninstall: vec![],
        };
        let mut out = Vec::new();
        let report = execute(&ctx, &plan, InstallScope::CurrentUser, &mut out)
            .await
            .unwrap();

        assert_eq!(report.count(OutcomeKind::Failed), 1);
        assert_eq!(report.count(OutcomeKind::Installed), 1);
    }

    #[tokio::test]
    async fn test_all_users_requires_privileges() {
        let backend = Arc::new(FakeBackend::new());
        backend.publish("A", "1.0");
        let ctx = test_context(backend.clone(), catalog_of(&["A"]), false, 0);

        let plan = BatchPlan {
            install: vec!["A".into()],
            uninstall: vec![],
        };
        let mut out = Vec::new();
        assert!(execute(&ctx, &plan, InstallScope::AllUsers, &mut out).await.is_err());
        assert!(backend.calls().is_empty());
    }
}
