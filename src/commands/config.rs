//! Configuration for a run.
//!
//! Values come from the command line (or their environment variables) and
//! are folded into a [`Config`] before any service is built.

use std::path::PathBuf;

use anyhow::Result;
use log::debug;

use crate::{
    application::SessionOptions,
    backend::{BackendKind, InstallScope},
    package::Catalog,
    runtime::Runtime,
};

/// Overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub catalog: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub scope: Option<InstallScope>,
    pub prerelease: bool,
    pub assume_yes: bool,
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog: Catalog,
    /// Forced backend generation; probed when `None`.
    pub backend: Option<BackendKind>,
    pub options: SessionOptions,
}

impl Config {
    pub fn load<R: Runtime + ?Sized>(runtime: &R, overrides: ConfigOverrides) -> Result<Self> {
        let catalog = Catalog::resolve(runtime, overrides.catalog.as_deref())?;
        debug!("Catalog has {} module(s)", catalog.len());

        let options = SessionOptions {
            scope: overrides.scope.unwrap_or_default(),
            allow_prerelease: overrides.prerelease,
            assume_yes: overrides.assume_yes,
        };

        Ok(Self {
            catalog,
            backend: overrides.backend,
            options,
        })
    }
}
