mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "x4_catalog=info,x4cat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Distill { source, output } => {
            commands::distill::handle(&source, &output)?;
        }

        Commands::Merge { source, output } => {
            commands::merge::handle(&source, &output)?;
        }

        Commands::Audit { source, json } => {
            commands::audit::handle(&source, json)?;
        }

        Commands::Configure { show, init, force } => {
            commands::configure::handle(show, init, force)?;
        }
    }

    Ok(())
}
