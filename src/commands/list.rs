use std::io::Write;

use anyhow::Result;
use log::debug;

use crate::application::{ModuleStatus, Reporter, SessionContext};

/// Compare installed catalog modules with their registries.
#[tracing::instrument(skip(ctx, out))]
pub async fn list(ctx: &SessionContext, include_missing: bool, out: &mut dyn Write) -> Result<()> {
    debug!("Reporting on {} catalog module(s)", ctx.catalog.len());
    writeln!(
        out,
        "{:<45} {:<18} {:<18} {}",
        "MODULE", "INSTALLED", "AVAILABLE", "STATUS"
    )?;

    let reports = Reporter::new(ctx).report_all(include_missing, out).await?;
    if reports.is_empty() {
        writeln!(out, "No catalog modules installed.")?;
        return Ok(());
    }

    let outdated = reports
        .iter()
        .filter(|r| r.status == ModuleStatus::Outdated)
        .count();
    if outdated > 0 {
        writeln!(
            out,
            "\n{} module(s) can be updated. Run `cloudmod update` from an elevated session.",
            outdated
        )?;
    }
    Ok(())
}
