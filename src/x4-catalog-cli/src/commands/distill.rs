//! Distill command handler

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;
use x4_catalog::{distill, Catalog, DiffPatcher, GameLayout};

use crate::cli::SourceArgs;
use crate::config;

/// Run the full pipeline and write the catalog to `output`
pub fn handle(source: &SourceArgs, output: &Path) -> Result<()> {
    let catalog = run(source)?;

    catalog
        .write(output)
        .with_context(|| format!("Failed to write catalog to {}", output.display()))?;

    print_summary(&catalog, output);
    Ok(())
}

/// Run the pipeline without writing anything
pub fn run(source: &SourceArgs) -> Result<Catalog> {
    let config = config::for_source(source)?;

    if !GameLayout::new(&source.root).is_valid() {
        bail!(
            "{} does not look like an X4 data tree (libraries/wares.xml missing)",
            source.root.display()
        );
    }

    info!(
        root = %source.root.display(),
        expansions = ?config.dlc_order,
        languages = config.languages.len(),
        "distilling game data"
    );

    distill(&source.root, &config, &DiffPatcher)
        .with_context(|| format!("Failed to distill {}", source.root.display()))
}

fn print_summary(catalog: &Catalog, output: &Path) {
    println!("Catalog written to {}", output.display());
    println!("  Wares:     {}", catalog.wares.len());
    println!("  Modules:   {}", catalog.modules.len());
    println!("  Groups:    {}", catalog.groups.len());
    println!(
        "  Languages: {}",
        catalog
            .languages
            .iter()
            .map(|l| l.code.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if !catalog.diagnostics.is_clean() {
        println!();
        println!("Problems were found; run `x4cat audit` for the full report.");
    }
}
