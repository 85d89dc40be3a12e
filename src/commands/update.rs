use std::io::Write;

use anyhow::Result;

use crate::application::{BatchReport, OutcomeKind, SessionContext, Updater};

/// Update outdated catalog modules and remove the versions they replace.
#[tracing::instrument(skip(ctx, out))]
pub async fn update(ctx: &SessionContext, out: &mut dyn Write) -> Result<()> {
    let report = Updater::new(ctx).update_all(out).await?;
    conclude(&report, out)
}

/// Remove all but the newest version of every installed catalog module.
#[tracing::instrument(skip(ctx, out))]
pub async fn clean(ctx: &SessionContext, out: &mut dyn Write) -> Result<()> {
    let report = Updater::new(ctx).clean_all(out).await?;
    conclude(&report, out)
}

fn conclude(report: &BatchReport, out: &mut dyn Write) -> Result<()> {
    if report.is_empty() {
        writeln!(out, "Nothing to do.")?;
        return Ok(());
    }
    writeln!(out, "{}", report.summary())?;

    let failed = report.count(OutcomeKind::Failed);
    if failed > 0 {
        anyhow::bail!("{} module action(s) failed, see the log above", failed);
    }
    Ok(())
}
