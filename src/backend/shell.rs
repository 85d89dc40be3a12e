//! PowerShell host used by both backend generations.
//!
//! Every backend call is a short script run in a fresh, non-interactive
//! host; results come back as JSON on stdout.

use async_trait::async_trait;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use which::which;

use super::BackendError;

/// Host executables, in order of preference.
pub const HOST_CANDIDATES: &[&str] = &["pwsh", "powershell"];

const PRELUDE: &str = "$ErrorActionPreference = 'Stop'\n$ProgressPreference = 'SilentlyContinue'\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("No PowerShell host found (tried {0})")]
    HostUnavailable(String),
    #[error("{0}")]
    Failed(String),
}

impl ScriptError {
    /// Attach the module being processed and classify the failure.
    pub fn for_module(self, module: &str) -> BackendError {
        match self {
            Self::HostUnavailable(tried) => BackendError::HostUnavailable { tried },
            Self::Failed(message) => BackendError::classify(module, &message),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a script and return its standard output.
    async fn run(&self, script: &str) -> Result<String, ScriptError>;

    /// Whether a command is available in the host.
    async fn command_exists(&self, name: &str) -> bool;

    /// Number of PowerShell processes running on this machine, excluding the
    /// probe itself. The shell the operator started us from is included.
    async fn host_session_count(&self) -> usize;
}

/// Appends modules found on the module path but unknown to the package
/// tool to `$items`. Expects `$name` and `$items` to be set. Known packages
/// are matched by name and numeric version, since PSResourceGet reports the
/// modules root rather than the version folder as the install location.
pub(crate) const LIST_AVAILABLE_STEP: &str = r#"$known = @($items | ForEach-Object { '{0}/{1}' -f $_.Name, ([string]$_.Version -split '-')[0] })
$items += @(Get-Module -Name $name -ListAvailable -ErrorAction SilentlyContinue | Where-Object { $known -notcontains ('{0}/{1}' -f $_.Name, [string]$_.Version) } | ForEach-Object {
    [pscustomobject]@{
        Name = $_.Name
        Version = [string]$_.Version
        Prerelease = [string]$_.PrivateData.PSData.Prerelease
        InstalledLocation = $_.ModuleBase
        RepositorySourceLocation = $null
        Dependencies = @($_.RequiredModules | ForEach-Object {
            [pscustomobject]@{ Name = $_.Name; VersionConstraint = [string]$_.Version; Prerelease = $false }
        })
    }
})
"#;

/// Quote a value as a single-quoted PowerShell string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Script step that removes a module from the host session before its
/// files are replaced or deleted.
///
/// Only the fresh host running the script is affected, and it starts with
/// nothing imported. Modules loaded in the operator's other sessions are
/// untouched; the updater's session-count warning covers those.
pub fn unload_step(name: &str) -> String {
    format!(
        "Get-Module -Name {} -ErrorAction SilentlyContinue | Remove-Module -Force -ErrorAction SilentlyContinue\n",
        quote(name)
    )
}

#[derive(Debug, Clone)]
pub struct PowerShellHost {
    program: PathBuf,
}

impl PowerShellHost {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }

    /// Find `pwsh`, falling back to Windows PowerShell.
    pub fn locate() -> Result<Self, ScriptError> {
        for candidate in HOST_CANDIDATES {
            if let Ok(path) = which(candidate) {
                debug!("Using PowerShell host {}", path.display());
                return Ok(Self::new(path));
            }
        }
        Err(ScriptError::HostUnavailable(HOST_CANDIDATES.join(", ")))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl Shell for PowerShellHost {
    async fn run(&self, script: &str) -> Result<String, ScriptError> {
        trace!("PowerShell script:\n{}", script);

        let output = Command::new(&self.program)
            .args(["-NoLogo", "-NoProfile", "-NonInteractive", "-Command"])
            .arg(format!("{}{}", PRELUDE, script))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScriptError::Failed(format!("failed to start {}: {}", self.program.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        debug!("PowerShell exit status: {:?}", output.status);
        if !stderr.trim().is_empty() {
            trace!("PowerShell stderr: {}", stderr);
        }

        if output.status.success() {
            Ok(stdout)
        } else if stderr.trim().is_empty() {
            Err(ScriptError::Failed(stdout))
        } else {
            Err(ScriptError::Failed(stderr))
        }
    }

    async fn command_exists(&self, name: &str) -> bool {
        let script = format!(
            "if (Get-Command -Name {} -ErrorAction SilentlyContinue) {{ 'true' }} else {{ 'false' }}",
            quote(name)
        );
        matches!(self.run(&script).await, Ok(out) if out.trim().eq_ignore_ascii_case("true"))
    }

    async fn host_session_count(&self) -> usize {
        let script = "@(Get-Process -Name pwsh, powershell -ErrorAction SilentlyContinue | Where-Object Id -ne $PID).Count";
        match self.run(script).await {
            Ok(out) => out.trim().parse().unwrap_or(0),
            Err(e) => {
                debug!("Could not count host sessions: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("Az"), "'Az'");
        assert_eq!(quote("it's"), "'it''s'");
    }

    #[test]
    fn test_unload_step() {
        let step = unload_step("MicrosoftTeams");
        assert!(step.starts_with("Get-Module -Name 'MicrosoftTeams'"));
        assert!(step.contains("Remove-Module -Force"));
    }

    #[test]
    fn test_list_available_matches_known_by_name_and_version() {
        assert!(LIST_AVAILABLE_STEP.contains("$known = @($items | ForEach-Object { '{0}/{1}' -f $_.Name"));
        assert!(LIST_AVAILABLE_STEP.contains("$known -notcontains ('{0}/{1}' -f $_.Name, [string]$_.Version)"));
        assert!(!LIST_AVAILABLE_STEP.contains("-notcontains $_.ModuleBase"));
    }

    #[test]
    fn test_script_error_for_module() {
        let err = ScriptError::Failed("Access to the path is denied".into()).for_module("Az");
        assert_eq!(err, BackendError::Permission { module: "Az".into() });

        let err = ScriptError::HostUnavailable("pwsh".into()).for_module("Az");
        assert!(matches!(err, BackendError::HostUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure() {
        let host = PowerShellHost::new(PathBuf::from("/nonexistent/pwsh-for-tests"));
        let err = host.run("'hello'").await.unwrap_err();
        assert!(matches!(err, ScriptError::Failed(ref m) if m.contains("failed to start")));
        assert!(!host.command_exists("Get-Module").await);
        assert_eq!(host.host_session_count().await, 0);
    }
}
