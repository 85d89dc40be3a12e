//! PowerShellGet v2 backend (`Install-Module` and friends).

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use super::records::{RawInstalled, RawRemote, decode_list, newest};
use super::shell::{LIST_AVAILABLE_STEP, Shell, quote, unload_step};
use super::{
    BackendError, BackendKind, InstallOptions, InstallScope, InstalledPackage, ListOptions,
    PackageBackend, RemotePackage, UninstallOptions, UninstallTarget, UpdateOptions,
};

pub struct LegacyBackend {
    shell: Arc<dyn Shell>,
    home: Option<PathBuf>,
}

impl LegacyBackend {
    pub fn new(shell: Arc<dyn Shell>, home: Option<PathBuf>) -> Self {
        Self { shell, home }
    }

    fn list_script(name: &str, list_available: bool) -> String {
        let mut script = format!(
            r#"$name = {name}
$items = @(Get-InstalledModule -Name $name -AllVersions -ErrorAction SilentlyContinue | ForEach-Object {{
    [pscustomobject]@{{
        Name = $_.Name
        Version = [string]$_.Version
        Prerelease = $null
        InstalledLocation = $_.InstalledLocation
        RepositorySourceLocation = [string]$_.RepositorySourceLocation
        Dependencies = @($_.Dependencies | ForEach-Object {{
            [pscustomobject]@{{
                Name = $_.Name
                VersionConstraint = [string](@($_.RequiredVersion, $_.MinimumVersion) | Where-Object {{ $_ }} | Select-Object -First 1)
                Prerelease = $false
            }}
        }})
    }}
}})
"#,
            name = quote(name)
        );

        if list_available {
            script.push_str(LIST_AVAILABLE_STEP);
        }

        script.push_str("ConvertTo-Json -InputObject @($items) -Depth 5 -Compress\n");
        script
    }

    fn find_script(name: &str, prerelease: bool) -> String {
        format!(
            r#"try {{
    $found = @(Find-Module -Name {name}{pre} -ErrorAction Stop)
}} catch {{
    if ($_.Exception.Message -match 'No match was found') {{ $found = @() }} else {{ throw }}
}}
$out = @($found | ForEach-Object {{
    [pscustomobject]@{{ Name = $_.Name; Version = [string]$_.Version; Prerelease = $null; Repository = $_.Repository }}
}})
ConvertTo-Json -InputObject $out -Compress
"#,
            name = quote(name),
            pre = if prerelease { " -AllowPrerelease" } else { "" }
        )
    }

    fn install_script(name: &str, options: InstallOptions) -> String {
        let mut cmd = format!(
            "Install-Module -Name {} -Scope {} -Force",
            quote(name),
            options.scope.as_param()
        );
        if options.allow_clobber {
            cmd.push_str(" -AllowClobber");
        }
        if options.prerelease {
            cmd.push_str(" -AllowPrerelease");
        }
        cmd.push('\n');
        cmd
    }

    fn update_script(name: &str, options: UpdateOptions) -> String {
        let mut script = unload_step(name);
        script.push_str(&format!(
            "Update-Module -Name {} -Scope {} -Force",
            quote(name),
            options.scope.as_param()
        ));
        if options.prerelease {
            script.push_str(" -AllowPrerelease");
        }
        script.push('\n');
        script
    }

    fn uninstall_script(name: &str, target: &UninstallTarget, options: UninstallOptions) -> String {
        let mut script = unload_step(name);
        script.push_str(&format!("Uninstall-Module -Name {} -Force", quote(name)));
        match target {
            UninstallTarget::All => script.push_str(" -AllVersions"),
            UninstallTarget::Version(v) => {
                script.push_str(&format!(" -RequiredVersion {}", quote(v)));
            }
        }
        if options.prerelease {
            script.push_str(" -AllowPrerelease");
        }
        script.push('\n');
        script
    }
}

#[async_trait]
impl PackageBackend for LegacyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    async fn list_installed(
        &self,
        name: &str,
        options: ListOptions,
    ) -> Result<Vec<InstalledPackage>, BackendError> {
        let output = self
            .shell
            .run(&Self::list_script(name, options.list_available))
            .await
            .map_err(|e| e.for_module(name))?;

        let records: Vec<RawInstalled> = decode_list("Get-InstalledModule", &output)?;
        let packages = records
            .into_iter()
            .map(|r| r.into_installed(self.home.as_deref()))
            // PowerShellGet v2 cannot filter by scope, so do it here.
            .filter(|p| options.all_scopes || p.scope == InstallScope::CurrentUser)
            .collect::<Vec<_>>();
        debug!("{}: {} installed record(s)", name, packages.len());
        Ok(packages)
    }

    async fn find(
        &self,
        name: &str,
        prerelease: bool,
    ) -> Result<Option<RemotePackage>, BackendError> {
        let output = self
            .shell
            .run(&Self::find_script(name, prerelease))
            .await
            .map_err(|e| e.for_module(name))?;

        let records: Vec<RawRemote> = decode_list("Find-Module", &output)?;
        Ok(newest(records.into_iter().map(RawRemote::into_remote).collect()))
    }

    async fn install(&self, name: &str, options: InstallOptions) -> Result<(), BackendError> {
        self.shell
            .run(&Self::install_script(name, options))
            .await
            .map(|_| ())
            .map_err(|e| e.for_module(name))
    }

    async fn update(&self, name: &str, options: UpdateOptions) -> Result<(), BackendError> {
        self.shell
            .run(&Self::update_script(name, options))
            .await
            .map(|_| ())
            .map_err(|e| e.for_module(name))
    }

    async fn uninstall(
        &self,
        name: &str,
        target: &UninstallTarget,
        options: UninstallOptions,
    ) -> Result<(), BackendError> {
        self.shell
            .run(&Self::uninstall_script(name, target, options))
            .await
            .map(|_| ())
            .map_err(|e| e.for_module(name))
    }
}
