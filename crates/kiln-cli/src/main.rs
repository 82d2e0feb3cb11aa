//! `kiln`: run one supervised process on a pseudo-terminal

mod cli;
mod logging;
mod runner;

use anyhow::{Context, Result};
use clap::Parser;
use kiln_process::{EnvironmentSettings, SettingsLoader};
use tracing::debug;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level)?;

    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Run(args) => {
            let code = runner::run(args, settings).await?;
            debug!(exit_code = code, "Exiting with process exit code");
            // Exit directly; a pending stdin read would otherwise hold the runtime open.
            std::process::exit(code);
        }
        Commands::Settings => {
            let rendered =
                toml::to_string_pretty(&settings).context("failed to render settings")?;
            print!("{rendered}");
        }
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> Result<EnvironmentSettings> {
    let loader = match &cli.config {
        Some(path) => SettingsLoader::with_path(path),
        None => SettingsLoader::new(),
    };
    loader.load().context("failed to load settings")
}
