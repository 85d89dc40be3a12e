//! Per-module results of a batch operation.

use std::fmt;
use std::io::{self, Write};

use log::{error, warn};

use crate::backend::BackendError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Installed,
    Updated,
    Uninstalled,
    /// Nothing to do, or the module was deliberately left alone.
    Skipped,
    /// A permission, in-use or dependency condition stopped this action.
    Warning,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub module: String,
    pub version: Option<String>,
    pub kind: OutcomeKind,
    pub detail: Option<String>,
}

impl ActionOutcome {
    pub fn new(kind: OutcomeKind, module: &str, version: Option<String>) -> Self {
        Self {
            module: module.to_string(),
            version,
            kind,
            detail: None,
        }
    }

    pub fn skipped(module: &str, reason: impl Into<String>) -> Self {
        Self {
            detail: Some(reason.into()),
            ..Self::new(OutcomeKind::Skipped, module, None)
        }
    }

    /// Classify a backend failure as warning or error.
    pub fn from_error(module: &str, version: Option<String>, err: &BackendError) -> Self {
        let kind = if err.is_warning() {
            OutcomeKind::Warning
        } else {
            OutcomeKind::Failed
        };
        Self {
            detail: Some(err.to_string()),
            ..Self::new(kind, module, version)
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            OutcomeKind::Installed => "installed",
            OutcomeKind::Updated => "updated",
            OutcomeKind::Uninstalled => "uninstalled",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::Warning => "warning",
            OutcomeKind::Failed => "failed",
        };
        write!(f, "{} {}", verb, self.module)?;
        if let Some(version) = &self.version {
            write!(f, " {}", version)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Outcomes of one batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ActionOutcome>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome and stream it as it happens. Successes go to `out`,
    /// warnings and failures go through the logger. The outcome is kept even
    /// when writing to `out` fails.
    pub fn record(&mut self, outcome: ActionOutcome, out: &mut dyn Write) -> io::Result<()> {
        let written = match outcome.kind {
            OutcomeKind::Warning => {
                warn!("{}", outcome);
                Ok(())
            }
            OutcomeKind::Failed => {
                error!("{}", outcome);
                Ok(())
            }
            _ => writeln!(out, "   {}", outcome),
        };
        self.outcomes.push(outcome);
        written
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    /// Outcomes of one kind for one module.
    pub fn of(&self, kind: OutcomeKind, module: &str) -> Vec<&ActionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.kind == kind && o.module.eq_ignore_ascii_case(module))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} installed, {} updated, {} uninstalled, {} warning(s), {} failure(s).",
            self.count(OutcomeKind::Installed),
            self.count(OutcomeKind::Updated),
            self.count(OutcomeKind::Uninstalled),
            self.count(OutcomeKind::Warning),
            self.count(OutcomeKind::Failed),
        )
    }
}
