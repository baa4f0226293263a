//! Merge command handler
//!
//! Writes the goods library after every expansion overlay has been applied.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;
use x4_catalog::{merge_goods, DiffPatcher, GameLayout};

use crate::cli::SourceArgs;
use crate::config;

pub fn handle(source: &SourceArgs, output: &Path) -> Result<()> {
    let config = config::for_source(source)?;
    let layout = GameLayout::new(&source.root);

    if !layout.is_valid() {
        bail!("No goods library at {}", layout.wares().display());
    }

    info!(base = %layout.wares().display(), expansions = ?config.dlc_order, "merging goods library");
    let merged = merge_goods(&layout, &config, &DiffPatcher)
        .with_context(|| format!("Failed to merge {}", layout.wares().display()))?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::write(output, merged.to_xml_string())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Merged {} wares from {} expansion(s) into {}",
        merged.children_named("ware").count(),
        config
            .dlc_order
            .iter()
            .filter(|dlc| layout.extension(dlc).is_dir())
            .count(),
        output.display()
    );
    Ok(())
}
