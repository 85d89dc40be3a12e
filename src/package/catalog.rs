//! Catalog of the modules this tool knows how to manage.
//!
//! The catalog is an ordered JSON array of records:
//!
//! ```json
//! [{ "Module": "MicrosoftTeams", "Description": "Microsoft Teams",
//!    "Repo": "https://www.powershellgallery.com/api/v2",
//!    "ReplacedBy": null, "Replaces": null }]
//! ```
//!
//! It is loaded once at startup and never mutated afterwards.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use crate::runtime::Runtime;

const BUILTIN_CATALOG: &str = include_str!("../../catalog/modules.json");

/// File name looked up under the user's config directory.
pub const CATALOG_FILE_NAME: &str = "modules.json";

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog entry #{index} has an empty module name")]
    EmptyName { index: usize },
    #[error("module '{0}' appears more than once in the catalog")]
    Duplicate(String),
    #[error("module '{name}' has no usable registry URL: '{repo}'")]
    InvalidRepo { name: String, repo: String },
}

/// A module known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModuleDescriptor {
    #[serde(rename = "Module")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    /// Registry feed the module is expected to come from. Its authority is
    /// the identity key used to tell same-named packages apart.
    #[serde(rename = "Repo")]
    pub repository: String,
    #[serde(rename = "ReplacedBy", default)]
    pub replaced_by: Option<String>,
    #[serde(rename = "Replaces", default)]
    pub replaces: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(name: &str, repository: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            repository: repository.to_string(),
            replaced_by: None,
            replaces: None,
        }
    }

    /// Host part of the registry URL, e.g. `www.powershellgallery.com`.
    pub fn registry_authority(&self) -> Option<String> {
        registry_authority(&self.repository)
    }
}

/// Extract the authority (host and optional port) from a registry URL.
///
/// Scheme, user info and path are dropped and the result is lower-cased.
/// A bare host without scheme is accepted as-is.
pub fn registry_authority(url: &str) -> Option<String> {
    let rest = url.trim();
    let rest = rest.split_once("://").map_or(rest, |(_, r)| r);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, a)| a);

    if authority.is_empty() {
        None
    } else {
        Some(authority.to_lowercase())
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    modules: Vec<ModuleDescriptor>,
}

impl Catalog {
    /// The catalog shipped inside the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG).context("Built-in catalog is invalid")
    }

    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let modules: Vec<ModuleDescriptor> = serde_json::from_str(text)?;
        Self::from_descriptors(modules)
    }

    pub fn from_descriptors(modules: Vec<ModuleDescriptor>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for (index, module) in modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                return Err(CatalogError::EmptyName { index });
            }
            if !seen.insert(module.name.to_lowercase()) {
                return Err(CatalogError::Duplicate(module.name.clone()));
            }
            if module.registry_authority().is_none() {
                return Err(CatalogError::InvalidRepo {
                    name: module.name.clone(),
                    repo: module.repository.clone(),
                });
            }
        }
        Ok(Self { modules })
    }

    /// Load a catalog file.
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        let text = runtime.read_to_string(path)?;
        Self::from_json(&text).with_context(|| format!("Failed to load catalog {}", path.display()))
    }

    /// Pick the catalog for this run: an explicit path wins, then a
    /// `modules.json` in the user's config directory, then the built-in one.
    #[tracing::instrument(skip(runtime))]
    pub fn resolve<R: Runtime + ?Sized>(runtime: &R, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            debug!("Using catalog from {:?}", path);
            return Self::load(runtime, path);
        }

        if let Some(path) = user_catalog_path(runtime)
            && runtime.exists(&path)
        {
            debug!("Using user catalog from {:?}", path);
            return Self::load(runtime, &path);
        }

        debug!("Using built-in catalog");
        Self::builtin()
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.modules
    }

    /// Case-insensitive lookup, module names are not case-sensitive.
    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn user_catalog_path<R: Runtime + ?Sized>(runtime: &R) -> Option<PathBuf> {
    runtime
        .config_dir()
        .map(|dir| dir.join("cloudmod").join(CATALOG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;

    const GALLERY: &str = "https://www.powershellgallery.com/api/v2";

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert!(!catalog.is_empty());
        let teams = catalog.get("microsoftteams").unwrap();
        assert_eq!(teams.name, "MicrosoftTeams");
        assert_eq!(
            teams.registry_authority().as_deref(),
            Some("www.powershellgallery.com")
        );
    }

    #[test]
    fn test_parse_record_fields() {
        let catalog = Catalog::from_json(
            r#"[
                {"Module": "AzureAD", "Description": "Azure AD", "Repo": "https://www.powershellgallery.com/api/v2", "ReplacedBy": "Microsoft.Graph"},
                {"Module": "Microsoft.Graph", "Description": "Graph", "Repo": "https://www.powershellgallery.com/api/v2", "Replaces": "AzureAD"}
            ]"#,
        )
        .unwrap();

        let names: Vec<&str> = catalog.descriptors().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["AzureAD", "Microsoft.Graph"]);
        assert_eq!(
            catalog.descriptors()[0].replaced_by.as_deref(),
            Some("Microsoft.Graph")
        );
        assert_eq!(catalog.descriptors()[1].replaces.as_deref(), Some("AzureAD"));
    }

    #[test]
    fn test_rejects_duplicates_and_bad_repos() {
        let dup = vec![
            ModuleDescriptor::new("Az", GALLERY),
            ModuleDescriptor::new("az", GALLERY),
        ];
        assert!(matches!(
            Catalog::from_descriptors(dup),
            Err(CatalogError::Duplicate(_))
        ));

        let bad_repo = vec![ModuleDescriptor::new("Az", "https:///path")];
        assert!(matches!(
            Catalog::from_descriptors(bad_repo),
            Err(CatalogError::InvalidRepo { .. })
        ));

        let empty = vec![ModuleDescriptor::new(" ", GALLERY)];
        assert!(matches!(
            Catalog::from_descriptors(empty),
            Err(CatalogError::EmptyName { index: 0 })
        ));

        assert!(matches!(
            Catalog::from_json(r#"[{"Description": "no name"}]"#),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_registry_authority() {
        assert_eq!(
            registry_authority("https://www.PowerShellGallery.com/api/v2").as_deref(),
            Some("www.powershellgallery.com")
        );
        assert_eq!(
            registry_authority("https://poshtestgallery.com/api/v2/").as_deref(),
            Some("poshtestgallery.com")
        );
        assert_eq!(
            registry_authority("http://user@feed.local:8080/nuget?x=1").as_deref(),
            Some("feed.local:8080")
        );
        assert_eq!(
            registry_authority("feed.example.org").as_deref(),
            Some("feed.example.org")
        );
        assert_eq!(registry_authority(""), None);
    }

    #[test]
    fn test_resolve_prefers_explicit_path() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .with(eq(PathBuf::from("/tmp/custom.json")))
            .returning(|_| Ok(format!(r#"[{{"Module": "ORCA", "Repo": "{}"}}]"#, GALLERY)));

        let catalog = Catalog::resolve(&runtime, Some(Path::new("/tmp/custom.json"))).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.descriptors()[0].name, "ORCA");
    }

    #[test]
    fn test_resolve_uses_user_catalog_when_present() {
        let mut runtime = MockRuntime::new();
        let user_file = PathBuf::from("/home/user/.config/cloudmod/modules.json");
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));
        runtime
            .expect_exists()
            .with(eq(user_file.clone()))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(user_file))
            .returning(|_| Ok(format!(r#"[{{"Module": "Az", "Repo": "{}"}}]"#, GALLERY)));

        let catalog = Catalog::resolve(&runtime, None).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_resolve_falls_back_to_builtin() {
        let mut runtime = MockRuntime::new();
        runtime.expect_config_dir().returning(|| None);

        let catalog = Catalog::resolve(&runtime, None).unwrap();
        assert_eq!(catalog.len(), Catalog::builtin().unwrap().len());
    }

    #[test]
    fn test_load_reports_path_on_error() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("not json".to_string()));

        let err = Catalog::load(&runtime, Path::new("/tmp/broken.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/tmp/broken.json"));
    }
}
