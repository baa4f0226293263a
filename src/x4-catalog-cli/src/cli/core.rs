//! Core CLI definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "x4cat")]
#[command(about = "X4 game data distiller", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the game data lives and how to read it
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Unpacked game data root (contains libraries/, assets/, extensions/, t/)
    pub root: PathBuf,

    /// Pipeline configuration file (uses the configured default if not provided)
    #[arg(short, long, env = "X4CAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Expansion merge order, overriding the configuration (comma separated)
    #[arg(long = "dlc", value_delimiter = ',')]
    pub dlc: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the catalog and write data/ and locales/ JSON
    #[command(visible_alias = "d")]
    Distill {
        #[command(flatten)]
        source: SourceArgs,

        /// Output directory
        #[arg(short, long, default_value = "public")]
        output: PathBuf,
    },

    /// Write the merged goods library (base plus expansion overlays)
    #[command(visible_alias = "m")]
    Merge {
        #[command(flatten)]
        source: SourceArgs,

        /// Output file
        #[arg(short, long, default_value = "wares_final.xml")]
        output: PathBuf,
    },

    /// Run the pipeline and print the diagnostics report without writing data
    #[command(visible_alias = "a")]
    Audit {
        #[command(flatten)]
        source: SourceArgs,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or create the default pipeline configuration
    #[command(visible_alias = "c")]
    Configure {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Write the stock configuration to the config file
        #[arg(long)]
        init: bool,

        /// Overwrite an existing config file with --init
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distill_args() {
        let cli = Cli::try_parse_from([
            "x4cat",
            "distill",
            "/games/x4",
            "-o",
            "out",
            "--dlc",
            "ego_dlc_boron,ego_dlc_split",
        ])
        .unwrap();

        match cli.command {
            Commands::Distill { source, output } => {
                assert_eq!(source.root, PathBuf::from("/games/x4"));
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(source.dlc, ["ego_dlc_boron", "ego_dlc_split"]);
                assert!(source.config.is_none());
            }
            _ => panic!("expected distill"),
        }
    }

    #[test]
    fn test_merge_default_output() {
        let cli = Cli::try_parse_from(["x4cat", "m", "/games/x4"]).unwrap();
        match cli.command {
            Commands::Merge { output, .. } => assert_eq!(output, PathBuf::from("wares_final.xml")),
            _ => panic!("expected merge"),
        }
    }

    #[test]
    fn test_root_is_required() {
        assert!(Cli::try_parse_from(["x4cat", "audit"]).is_err());
    }
}
