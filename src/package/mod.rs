//! Module catalog and version model.
//!
//! This module describes *what* can be managed: the static list of known
//! modules and the ordering of their versions.

mod catalog;
mod version;

pub use catalog::{CATALOG_FILE_NAME, Catalog, CatalogError, ModuleDescriptor, registry_authority};
pub use version::{VersionParseError, VersionToken, compare, full_version, is_newer};
