//! Report action - compares installed modules with the registry.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use log::{debug, info};

use super::SessionContext;
use super::scan::ModuleScanner;
use crate::package::{ModuleDescriptor, is_newer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Ok,
    Outdated,
    Unknown,
    NotInstalled,
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleStatus::Ok => write!(f, "ok"),
            ModuleStatus::Outdated => write!(f, "outdated"),
            ModuleStatus::Unknown => write!(f, "unknown"),
            ModuleStatus::NotInstalled => write!(f, "not installed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    pub name: String,
    pub local: Option<String>,
    pub remote: Option<String>,
    pub status: ModuleStatus,
    pub replaced_by: Option<String>,
}

impl fmt::Display for ModuleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<45} {:<18} {:<18} {}",
            self.name,
            self.local.as_deref().unwrap_or("-"),
            self.remote.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

/// Decide the status from a local and remote version.
///
/// A local version ahead of the registry (side-loaded prerelease builds)
/// counts as up to date.
pub fn classify(local: Option<&str>, remote: Option<&str>) -> ModuleStatus {
    match (local, remote) {
        (None, _) => ModuleStatus::NotInstalled,
        (Some(_), None) => ModuleStatus::Unknown,
        (Some(local), Some(remote)) => match is_newer(local, remote) {
            Some(true) => ModuleStatus::Outdated,
            Some(false) => ModuleStatus::Ok,
            None => ModuleStatus::Unknown,
        },
    }
}

pub struct Reporter<'a> {
    ctx: &'a SessionContext,
}

impl<'a> Reporter<'a> {
    pub fn new(ctx: &'a SessionContext) -> Self {
        Self { ctx }
    }

    /// Report one module. Never fails: lookup errors degrade to `Unknown`.
    #[tracing::instrument(skip(self, descriptor), fields(module = %descriptor.name))]
    pub async fn report(&self, descriptor: &ModuleDescriptor) -> ModuleReport {
        let mut report = ModuleReport {
            name: descriptor.name.clone(),
            local: None,
            remote: None,
            status: ModuleStatus::Unknown,
            replaced_by: descriptor.replaced_by.clone(),
        };

        let scan = match ModuleScanner::new(self.ctx.backend.as_ref())
            .scan(descriptor)
            .await
        {
            Ok(scan) => scan,
            Err(e) => {
                info!("Could not scan {}: {}", descriptor.name, e);
                return report;
            }
        };

        let Some(record) = scan.record else {
            report.status = ModuleStatus::NotInstalled;
            return report;
        };
        report.local = Some(record.full_version());

        let prerelease = self.ctx.options.allow_prerelease || record.is_prerelease();
        match self.ctx.backend.find(&descriptor.name, prerelease).await {
            Ok(Some(remote)) => report.remote = Some(remote.full_version()),
            Ok(None) => debug!("{} not found in any registry", descriptor.name),
            Err(e) => info!("Registry lookup for {} failed: {}", descriptor.name, e),
        }

        report.status = classify(report.local.as_deref(), report.remote.as_deref());
        report
    }

    /// Report every catalog module, streaming one line per module to `out`.
    /// Modules that are not installed are only listed when `include_missing`.
    #[tracing::instrument(skip(self, out))]
    pub async fn report_all(
        &self,
        include_missing: bool,
        out: &mut dyn Write,
    ) -> Result<Vec<ModuleReport>> {
        let mut reports = Vec::new();
        for descriptor in self.ctx.catalog.descriptors() {
            let report = self.report(descriptor).await;
            if report.status == ModuleStatus::NotInstalled && !include_missing {
                continue;
            }

            writeln!(out, "{}", report)?;
            if let Some(replacement) = &report.replaced_by {
                writeln!(
                    out,
                    "   note: {} is superseded by {}",
                    report.name, replacement
                )?;
            }
            reports.push(report);
        }
        Ok(reports)
    }
}
