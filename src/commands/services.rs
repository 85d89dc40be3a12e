//! Service factory for building the session context.
//!
//! This separates construction of the PowerShell host and package backend
//! from configuration. The backend is probed here once and shared by every
//! use case for the rest of the run.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;

use crate::{
    application::SessionContext,
    backend::{PackageBackend, PowerShellHost, Shell, detect_backend, select_backend},
    runtime::Runtime,
};

use super::config::Config;

/// Locate the PowerShell host executable.
pub fn build_shell() -> Result<Arc<dyn Shell>> {
    let host = PowerShellHost::locate()
        .context("PowerShell is required to manage modules; install pwsh and retry")?;
    debug!("PowerShell host: {}", host.program().display());
    Ok(Arc::new(host))
}

/// Pick the backend: forced by configuration, otherwise probed.
pub async fn build_backend(
    runtime: &dyn Runtime,
    shell: Arc<dyn Shell>,
    config: &Config,
) -> Arc<dyn PackageBackend> {
    let home = runtime.home_dir();
    match config.backend {
        Some(kind) => {
            debug!("Backend forced to {}", kind);
            select_backend(kind, shell, home)
        }
        None => detect_backend(shell, home).await,
    }
}

/// Assemble everything a use case needs.
pub async fn build_context(
    runtime: Arc<dyn Runtime>,
    shell: Arc<dyn Shell>,
    config: Config,
) -> SessionContext {
    let backend = build_backend(runtime.as_ref(), shell.clone(), &config).await;
    SessionContext::new(runtime, shell, backend, config.catalog, config.options)
}
