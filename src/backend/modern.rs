//! PSResourceGet backend (`Install-PSResource` and friends).

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

pub struct ModernBackend {
    shell: Arc<dyn Shell>,
    home: Option<PathBuf>,
}

impl ModernBackend {
    pub fn new(shell: Arc<dyn Shell>, home: Option<PathBuf>) -> Self {
        Self { shell, home }
    }

    fn list_script(name: &str, options: ListOptions) -> String {
        let scope = if options.all_scopes {
            String::new()
        } else {
            format!(" -Scope {}", InstallScope::CurrentUser.as_param())
        };

        let mut script = format!(
            r#"$name = {name}
$items = @(Get-InstalledPSResource -Name $name{scope} -ErrorAction SilentlyContinue | ForEach-Object {{
    [pscustomobject]@{{
        Name = $_.Name
        Version = [string]$_.Version
        Prerelease = $_.Prerelease
        InstalledLocation = $_.InstalledLocation
        RepositorySourceLocation = [string]$_.RepositorySourceLocation
        Dependencies = @($_.Dependencies | ForEach-Object {{
            [pscustomobject]@{{
                Name = $_.Name
                VersionConstraint = [string]$_.VersionRange
                Prerelease = ([string]$_.VersionRange -match '-')
            }}
        }})
    }}
}})
"#,
            name = quote(name),
            scope = scope
        );

        if options.list_available {
            script.push_str(LIST_AVAILABLE_STEP);
        }

        script.push_str("ConvertTo-Json -InputObject @($items) -Depth 5 -Compress\n");
        script
    }

    fn find_script(name: &str, prerelease: bool) -> String {
        format!(
            r#"try {{
    $found = @(Find-PSResource -Name {name} -Type Module{pre} -ErrorAction Stop)
}} catch {{
    if ($_.Exception.Message -match 'could not be found|No match was found') {{ $found = @() }} else {{ throw }}
}}
$out = @($found | ForEach-Object {{
    [pscustomobject]@{{ Name = $_.Name; Version = [string]$_.Version; Prerelease = $_.Prerelease; Repository = $_.Repository }}
}})
ConvertTo-Json -InputObject $out -Compress
"#,
            name = quote(name),
            pre = if prerelease { " -Prerelease" } else { "" }
        )
    }

    fn install_script(name: &str, options: InstallOptions) -> String {
        let mut cmd = format!(
            "Install-PSResource -Name {} -Scope {} -TrustRepository -AcceptLicense",
            quote(name),
            options.scope.as_param()
        );
        if !options.allow_clobber {
            cmd.push_str(" -NoClobber");
        }
        if options.prerelease {
            cmd.push_str(" -Prerelease");
        }
        cmd.push('\n');
        cmd
    }

    fn update_script(name: &str, options: UpdateOptions) -> String {
        let mut script = unload_step(name);
        script.push_str(&format!(
            "Update-PSResource -Name {} -Scope {} -TrustRepository -AcceptLicense",
            quote(name),
            options.scope.as_param()
        ));
        if options.prerelease {
            script.push_str(" -Prerelease");
        }
        script.push('\n');
        script
    }

    fn uninstall_script(name: &str, target: &UninstallTarget, options: UninstallOptions) -> String {
        let version = match target {
            UninstallTarget::All => quote("*"),
            UninstallTarget::Version(v) => quote(v),
        };
        let mut script = unload_step(name);
        script.push_str(&format!(
            "Uninstall-PSResource -Name {} -Version {}",
            quote(name),
            version
        ));
        if let Some(scope) = options.scope {
            script.push_str(&format!(" -Scope {}", scope.as_param()));
        }
        // -Prerelease narrows a wildcard removal to prerelease versions only.
        if options.prerelease && matches!(target, UninstallTarget::Version(_)) {
            script.push_str(" -Prerelease");
        }
        script.push('\n');
        script
    }
}

#[async_trait]
impl PackageBackend for ModernBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    async fn list_installed(
        &self,
        name: &str,
        options: ListOptions,
    ) -> Result<Vec<InstalledPackage>, BackendError> {
        let output = self
            .shell
            .run(&Self::list_script(name, options))
            .await
            .map_err(|e| e.for_module(name))?;

        let records: Vec<RawInstalled> = decode_list("Get-InstalledPSResource", &output)?;
        let packages: Vec<InstalledPackage> = records
            .into_iter()
            .map(|r| r.into_installed(self.home.as_deref()))
            .collect();
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

        let records: Vec<RawRemote> = decode_list("Find-PSResource", &output)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockShell, ScriptError};

    fn backend(shell: MockShell) -> ModernBackend {
        ModernBackend::new(Arc::new(shell), Some(PathBuf::from("/home/user")))
    }

    #[tokio::test]
    async fn test_list_installed_separate_prerelease_field() {
        let mut shell = MockShell::new();
        shell
            .expect_run()
            .withf(|s| s.contains("Get-InstalledPSResource -Name $name -ErrorAction"))
            .returning(|_| {
                Ok(r#"{"Name":"Microsoft.Graph","Version":"2.1.0","Prerelease":"preview1","InstalledLocation":"/usr/local/share/powershell/Modules","RepositorySourceLocation":"https://www.powershellgallery.com/api/v2","Dependencies":[{"Name":"Microsoft.Graph.Authentication","VersionConstraint":"[2.1.0, ]","Prerelease":false}]}"#.to_string())
            });

        let list = backend(shell)
            .list_installed("Microsoft.Graph", ListOptions { list_available: false, all_scopes: true })
            .await
            .unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].full_version(), "2.1.0-preview1");
        assert_eq!(list[0].scope, InstallScope::AllUsers);
        assert_eq!(list[0].dependencies[0].name, "Microsoft.Graph.Authentication");
    }

    #[tokio::test]
    async fn test_list_current_user_scope_is_passed_to_tool() {
        let mut shell = MockShell::new();
        shell
            .expect_run()
            .withf(|s| s.contains("Get-InstalledPSResource -Name $name -Scope CurrentUser"))
            .returning(|_| Ok(String::new()));

        let list = backend(shell)
            .list_installed("Az", ListOptions::default())
            .await
            .unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn test_find_uses_prerelease_switch() {
        let mut shell = MockShell::new();
        shell
            .expect_run()
            .withf(|s| s.contains("Find-PSResource -Name 'ExchangeOnlineManagement' -Type Module -Prerelease"))
            .returning(|_| {
                Ok(r#"[{"Name":"ExchangeOnlineManagement","Version":"3.5.0","Prerelease":"Preview2","Repository":"PSGallery"}]"#.to_string())
            });

        let found = backend(shell)
            .find("ExchangeOnlineManagement", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.full_version(), "3.5.0-Preview2");
    }

    #[tokio::test]
    async fn test_find_network_failure_is_registry_unavailable() {
        let mut shell = MockShell::new();
        shell
            .expect_run()
            .returning(|_| Err(ScriptError::Failed("Unable to resolve package source 'https://www.powershellgallery.com/api/v2'".into())));

        let err = backend(shell).find("Az", false).await.unwrap_err();
        assert!(matches!(err, BackendError::RegistryUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_uninstall_in_use_is_classified() {
        let mut shell = MockShell::new();
        shell
            .expect_run()
            .withf(|s| s.contains("Uninstall-PSResource -Name 'Az.Accounts' -Version '2.0.0' -Scope AllUsers"))
            .returning(|_| Err(ScriptError::Failed("The module 'Az.Accounts' is currently in use".into())));

        let err = backend(shell)
            .uninstall(
                "Az.Accounts",
                &UninstallTarget::Version("2.0.0".into()),
                UninstallOptions { prerelease: false, scope: Some(InstallScope::AllUsers) },
            )
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::InUse { module: "Az.Accounts".into() });
    }

    #[test]
    fn test_install_script_clobber_and_prerelease() {
        let script = ModernBackend::install_script(
            "MicrosoftTeams",
            InstallOptions { scope: InstallScope::AllUsers, prerelease: false, allow_clobber: false },
        );
        assert_eq!(
            script.trim(),
            "Install-PSResource -Name 'MicrosoftTeams' -Scope AllUsers -TrustRepository -AcceptLicense -NoClobber"
        );
    }

    #[test]
    fn test_uninstall_all_versions_uses_wildcard() {
        let script = ModernBackend::uninstall_script("Az", &UninstallTarget::All, UninstallOptions::default());
        assert!(script.contains("Uninstall-PSResource -Name 'Az' -Version '*'"));
        assert!(!script.contains("-Scope"));

        let script = ModernBackend::uninstall_script(
            "Az",
            &UninstallTarget::All,
            UninstallOptions { prerelease: true, scope: None },
        );
        assert!(!script.contains("-Prerelease"));
    }

    #[test]
    fn test_uninstall_prerelease_version() {
        let script = ModernBackend::uninstall_script(
            "ExchangeOnlineManagement",
            &UninstallTarget::Version("3.5.0-Preview2".into()),
            UninstallOptions { prerelease: true, scope: Some(InstallScope::CurrentUser) },
        );
        assert_eq!(
            script.lines().last().unwrap(),
            "Uninstall-PSResource -Name 'ExchangeOnlineManagement' -Version '3.5.0-Preview2' -Scope CurrentUser -Prerelease"
        );
    }

    #[test]
    fn test_update_script_unloads_first() {
        let script = ModernBackend::update_script(
            "Az",
            UpdateOptions { scope: InstallScope::CurrentUser, prerelease: true },
        );
        let unload = script.find("Remove-Module").unwrap();
        let update = script.find("Update-PSResource -Name 'Az' -Scope CurrentUser").unwrap();
        assert!(unload < update);
        assert!(script.trim_end().ends_with("-Prerelease"));
    }
}
