//! Configuration management for x4cat
//!
//! The pipeline configuration is read from `--config`, else from the user
//! config file, else the stock defaults are used.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use x4_catalog::PipelineConfig;

use crate::cli::SourceArgs;

/// Get the path to the user config file
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("x4cat");

    Ok(config_dir.join("config.toml"))
}

/// Load configuration from `path`, or the stock defaults if it doesn't exist
pub fn load_or_default(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }

    PipelineConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Resolve the configuration for one run, applying command-line overrides
pub fn for_source(source: &SourceArgs) -> Result<PipelineConfig> {
    let mut config = match &source.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => load_or_default(&config_path()?)?,
    };

    if !source.dlc.is_empty() {
        config.dlc_order = source.dlc.clone();
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Write the stock configuration to `path`
pub fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory at {}", parent.display())
        })?;
    }

    let contents = PipelineConfig::default()
        .to_toml()
        .context("Failed to serialize config")?;

    fs::write(path, contents)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}
