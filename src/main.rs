//! Specforge CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use specforge::cli::{build, Cli, Commands};
use specforge::infrastructure::config::ConfigLoader;
use specforge::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };
    let _log_guard = init_logging(&config.logging)?;

    let exit_code = match cli.command {
        Commands::Build {
            spec,
            output,
            continue_on_error,
            no_research,
            fresh,
        } => {
            if continue_on_error {
                config.continue_on_error = true;
            }
            if no_research {
                config.research_enabled = false;
            }
            build::handle_build(config, &spec, output, fresh, cli.json).await?
        }
        Commands::Plan { spec } => build::handle_plan(config, &spec, cli.json).await?,
        Commands::Research { spec, output } => {
            build::handle_research(config, &spec, output, cli.json).await?
        }
    };

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
