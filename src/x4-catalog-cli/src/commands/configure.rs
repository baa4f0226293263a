//! Configuration command handlers
//!
//! Handles the `configure` subcommand for the pipeline defaults.

use anyhow::Result;

use crate::config;

/// Handle the configure command
///
/// # Arguments
/// * `show` - If true, show the effective configuration
/// * `init` - If true, write the stock configuration to the config file
/// * `force` - Allow `init` to overwrite an existing file
pub fn handle(show: bool, init: bool, force: bool) -> Result<()> {
    let path = config::config_path()?;

    if init {
        config::write_default(&path, force)?;
        println!("Config saved to: {}", path.display());
        return Ok(());
    }

    if show {
        let current = config::load_or_default(&path)?;
        if path.exists() {
            println!("# Config file: {}", path.display());
        } else {
            println!("# No config file at {}, showing defaults", path.display());
        }
        print!("{}", current.to_toml()?);
        return Ok(());
    }

    show_usage();
    Ok(())
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: x4cat configure --show");
    println!("   or: x4cat configure --init [--force]");
    println!();
    println!("The config file sets the expansion merge order, target languages");
    println!("and module group names. Every key is optional.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_usage_does_not_panic() {
        show_usage();
    }
}
