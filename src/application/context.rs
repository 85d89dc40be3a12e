//! Session context shared by the use cases.

use std::sync::Arc;

use crate::backend::{InstallScope, PackageBackend, Shell};
use crate::package::Catalog;
use crate::runtime::Runtime;

/// Options chosen for this run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Scope used for installs and updates.
    pub scope: InstallScope,
    /// Consider prerelease versions when looking for updates.
    pub allow_prerelease: bool,
    /// Skip confirmation prompts.
    pub assume_yes: bool,
}

/// Everything a use case needs for one run.
///
/// The context is built once by the command layer and passed down by
/// reference. The backend is probed once and kept for the process lifetime.
pub struct SessionContext {
    pub runtime: Arc<dyn Runtime>,
    pub shell: Arc<dyn Shell>,
    pub backend: Arc<dyn PackageBackend>,
    pub catalog: Catalog,
    pub options: SessionOptions,
}

impl SessionContext {
    pub fn new(
        runtime: Arc<dyn Runtime>,
        shell: Arc<dyn Shell>,
        backend: Arc<dyn PackageBackend>,
        catalog: Catalog,
        options: SessionOptions,
    ) -> Self {
        Self {
            runtime,
            shell,
            backend,
            catalog,
            options,
        }
    }
}
