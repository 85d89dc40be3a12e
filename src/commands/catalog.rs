use std::io::Write;

use anyhow::Result;

use crate::package::Catalog;

/// Print the modules the catalog knows about. Works offline.
pub fn catalog(catalog: &Catalog, out: &mut dyn Write) -> Result<()> {
    for module in catalog.descriptors() {
        writeln!(out, "{:<45} {}", module.name, module.description)?;
        if let Some(replacement) = &module.replaced_by {
            writeln!(out, "{:<45} superseded by {}", "", replacement)?;
        }
    }
    Ok(())
}
