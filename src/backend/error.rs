use thiserror::Error;

/// Failure of a single backend call.
///
/// The first three kinds are expected operational conditions and are
/// reported as warnings; the batch moves on to the next module.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{module}: administrative rights are required")]
    Permission { module: String },

    #[error("{module}: the module is in use by another session")]
    InUse { module: String },

    #[error("{module}: other installed modules depend on this version")]
    Dependency { module: String },

    #[error("{module}: registry is unavailable: {details}")]
    RegistryUnavailable { module: String, details: String },

    #[error("{module}: not found in the registry")]
    NotFound { module: String },

    #[error("No PowerShell host found (tried {tried})")]
    HostUnavailable { tried: String },

    #[error("Unexpected output from {command}: {details}")]
    InvalidOutput { command: String, details: String },

    #[error("{module}: {message}")]
    Unknown { module: String, message: String },
}

const PERMISSION_MARKERS: &[&str] = &[
    "administrator rights",
    "administrative rights",
    "run as administrator",
    "access to the path",
    "access is denied",
    "unauthorizedaccess",
    "permission denied",
];

const IN_USE_MARKERS: &[&str] = &[
    "currently in use",
    "is in use",
    "being used by another process",
    "module is loaded",
    "currently loaded",
];

const DEPENDENCY_MARKERS: &[&str] = &[
    "depend on",
    "depends on",
    "dependent",
    "required by",
    "is a dependency",
];

const REGISTRY_MARKERS: &[&str] = &[
    "unable to resolve package source",
    "unable to find repository",
    "no such host",
    "could not be resolved",
    "timed out",
    "the remote server returned an error",
];

impl BackendError {
    /// Map the raw error text of a package tool onto an error kind.
    pub fn classify(module: &str, message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
        let module = module.to_string();

        if has(PERMISSION_MARKERS) {
            Self::Permission { module }
        } else if has(IN_USE_MARKERS) {
            Self::InUse { module }
        } else if has(DEPENDENCY_MARKERS) {
            Self::Dependency { module }
        } else if has(REGISTRY_MARKERS) {
            Self::RegistryUnavailable {
                module,
                details: first_line(message),
            }
        } else {
            Self::Unknown {
                module,
                message: first_line(message),
            }
        }
    }

    /// Permission, in-use and dependency failures are warnings, everything
    /// else is an error entry.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::Permission { .. } | Self::InUse { .. } | Self::Dependency { .. }
        )
    }
}

fn first_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown error")
        .to_string()
}
