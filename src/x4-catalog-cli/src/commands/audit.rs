//! Audit command handler
//!
//! Prints the classification and type-mapping report of a run.

use anyhow::{Context, Result};

use crate::cli::SourceArgs;
use crate::commands::distill;

pub fn handle(source: &SourceArgs, json: bool) -> Result<()> {
    let catalog = distill::run(source)?;

    if json {
        let report = serde_json::to_string_pretty(&catalog.diagnostics)
            .context("Failed to serialize report")?;
        println!("{}", report);
    } else {
        println!("Wares: {}", catalog.wares.len());
        print!("{}", catalog.diagnostics);
    }

    Ok(())
}
