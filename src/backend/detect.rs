use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use super::{BackendKind, LegacyBackend, ModernBackend, PackageBackend, Shell};

/// Command whose presence means PSResourceGet is installed.
pub const MODERN_MARKER_COMMAND: &str = "Install-PSResource";

/// Probe the host once and pick the backend generation to use for the rest
/// of the process.
#[tracing::instrument(skip(shell, home))]
pub async fn detect_backend(
    shell: Arc<dyn Shell>,
    home: Option<PathBuf>,
) -> Arc<dyn PackageBackend> {
    let kind = if shell.command_exists(MODERN_MARKER_COMMAND).await {
        BackendKind::Modern
    } else {
        BackendKind::Legacy
    };
    info!("Using {} package backend", kind);
    select_backend(kind, shell, home)
}

pub fn select_backend(
    kind: BackendKind,
    shell: Arc<dyn Shell>,
    home: Option<PathBuf>,
) -> Arc<dyn PackageBackend> {
    match kind {
        BackendKind::Modern => Arc::new(ModernBackend::new(shell, home)),
        BackendKind::Legacy => Arc::new(LegacyBackend::new(shell, home)),
    }
}
