//! Update and clean actions.
//!
//! Both batches walk the catalog in order and settle one module completely
//! (update, then removal of stale versions across the module and its
//! dependencies) before moving to the next. A failure is recorded against
//! the module it happened on and never stops the batch.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;
use log::{debug, info, warn};
use thiserror::Error;

use super::SessionContext;
use super::outcome::{ActionOutcome, BatchReport, OutcomeKind};
use super::scan::ModuleScanner;
use crate::backend::{UninstallOptions, UninstallTarget, UpdateOptions};
use crate::package::{ModuleDescriptor, is_newer};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("{operation} requires administrative privileges; run it from an elevated session")]
    NotElevated { operation: String },
}

/// Refuse to run a mutating batch without administrative rights.
pub fn ensure_privileged(ctx: &SessionContext, operation: &str) -> Result<(), PreconditionError> {
    if ctx.runtime.is_privileged() {
        Ok(())
    } else {
        Err(PreconditionError::NotElevated {
            operation: operation.to_string(),
        })
    }
}

pub struct Updater<'a> {
    ctx: &'a SessionContext,
}

impl<'a> Updater<'a> {
    pub fn new(ctx: &'a SessionContext) -> Self {
        Self { ctx }
    }

    /// Update every installed catalog module whose registry has a newer
    /// version, then remove the versions the update left behind.
    #[tracing::instrument(skip(self, out))]
    pub async fn update_all(&self, out: &mut dyn Write) -> Result<BatchReport> {
        ensure_privileged(self.ctx, "update")?;

        let mut report = BatchReport::new();
        if !self.check_other_sessions().await? {
            return Ok(report);
        }

        for descriptor in self.ctx.catalog.descriptors() {
            self.update_module(descriptor, &mut report, out).await?;
        }
        Ok(report)
    }

    /// Remove every version but the newest of each installed catalog module
    /// and of its dependencies, without contacting the registry.
    #[tracing::instrument(skip(self, out))]
    pub async fn clean_all(&self, out: &mut dyn Write) -> Result<BatchReport> {
        ensure_privileged(self.ctx, "clean")?;

        let mut report = BatchReport::new();
        if !self.check_other_sessions().await? {
            return Ok(report);
        }

        for descriptor in self.ctx.catalog.descriptors() {
            let scanner = ModuleScanner::new(self.ctx.backend.as_ref());
            let scan = match scanner.scan(descriptor).await {
                Ok(scan) => scan,
                Err(e) => {
                    report.record(ActionOutcome::from_error(&descriptor.name, None, &e), out)?;
                    continue;
                }
            };
            if !scan.installed {
                debug!("{} is not installed", descriptor.name);
                continue;
            }

            writeln!(out, "{}", descriptor.name)?;
            self.remove_stale_cascade(descriptor, &mut report, out).await?;
        }
        Ok(report)
    }

    /// Warn when more than one host process is running, since one of them is
    /// usually the shell the operator started us from. Returns false when the
    /// operator declines to continue.
    async fn check_other_sessions(&self) -> Result<bool> {
        let others = self.ctx.shell.host_session_count().await;
        if others <= 1 {
            debug!("{} PowerShell session(s) running", others);
            return Ok(true);
        }

        warn!(
            "{} PowerShell sessions are running; modules loaded there may break when replaced",
            others
        );
        if self.ctx.options.assume_yes {
            return Ok(true);
        }
        let proceed = self.ctx.runtime.confirm("Continue anyway?")?;
        if !proceed {
            info!("Aborted by user");
        }
        Ok(proceed)
    }

    async fn update_module(
        &self,
        descriptor: &ModuleDescriptor,
        report: &mut BatchReport,
        out: &mut dyn Write,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let backend = self.ctx.backend.as_ref();

        let scan = match ModuleScanner::new(backend).scan(descriptor).await {
            Ok(scan) => scan,
            Err(e) => {
                report.record(ActionOutcome::from_error(name, None, &e), out)?;
                return Ok(());
            }
        };
        if scan.is_side_loaded_only() {
            info!("{} was not installed by a package manager, leaving it alone", name);
            report.record(
                ActionOutcome::skipped(name, "not installed by a package manager"),
                out,
            )?;
            return Ok(());
        }
        let Some(record) = scan.record else {
            debug!("{} is not installed", name);
            return Ok(());
        };

        let local = record.full_version();
        writeln!(out, "{} {}", name, local)?;
        let prerelease = self.ctx.options.allow_prerelease || record.is_prerelease();
        let remote = match backend.find(name, prerelease).await {
            Ok(Some(remote)) => remote.full_version(),
            Ok(None) => {
                report.record(ActionOutcome::skipped(name, "not found in any registry"), out)?;
                return Ok(());
            }
            Err(e) => {
                report.record(ActionOutcome::from_error(name, Some(local), &e), out)?;
                return Ok(());
            }
        };

        if is_newer(&local, &remote) != Some(true) {
            report.record(
                ActionOutcome::skipped(name, format!("{} is up to date", local)),
                out,
            )?;
            return Ok(());
        }

        info!("Updating {} from {} to {}", name, local, remote);
        let options = UpdateOptions {
            scope: record.scope,
            prerelease,
        };
        if let Err(e) = backend.update(name, options).await {
            report.record(ActionOutcome::from_error(name, Some(remote), &e), out)?;
            return Ok(());
        }
        report.record(
            ActionOutcome::new(OutcomeKind::Updated, name, Some(remote)),
            out,
        )?;

        self.remove_stale_cascade(descriptor, report, out).await
    }

    /// Uninstall the non-latest versions of a module, then of each
    /// dependency declared by its latest version.
    async fn remove_stale_cascade(
        &self,
        descriptor: &ModuleDescriptor,
        report: &mut BatchReport,
        out: &mut dyn Write,
    ) -> Result<()> {
        let authority = descriptor.registry_authority();
        let Some(dependencies) = self
            .remove_stale(&descriptor.name, authority.as_deref(), report, out)
            .await?
        else {
            return Ok(());
        };

        let mut seen = HashSet::new();
        seen.insert(descriptor.name.to_lowercase());
        for dependency in dependencies {
            if seen.insert(dependency.to_lowercase()) {
                self.remove_stale(&dependency, authority.as_deref(), report, out)
                    .await?;
            }
        }
        Ok(())
    }

    /// Uninstall every version of `name` except the newest. Returns the
    /// dependency names of the newest version, or `None` when the module
    /// could not be listed or is not installed.
    async fn remove_stale(
        &self,
        name: &str,
        authority: Option<&str>,
        report: &mut BatchReport,
        out: &mut dyn Write,
    ) -> Result<Option<Vec<String>>> {
        let backend = self.ctx.backend.as_ref();
        let versions = match ModuleScanner::new(backend)
            .installed_versions(name, authority)
            .await
        {
            Ok(versions) => versions,
            Err(e) => {
                report.record(ActionOutcome::from_error(name, None, &e), out)?;
                return Ok(None);
            }
        };

        let Some((latest, stale)) = versions.split_first() else {
            return Ok(None);
        };
        for package in stale {
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

        Ok(Some(
            latest
                .dependencies
                .iter()
                .map(|d| d.name.clone())
                .collect(),
        ))
    }
}
