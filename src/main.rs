mod app;
mod capture;
mod cli;
mod config;
mod detection;
mod encoder;
mod error;
mod frame;
mod hooks;
mod messages;
mod overlay;
mod sampler;
mod services;
mod shortcuts;
mod store;
mod transport;

use app::App;
use clap::Parser;
use cli::{Cli, Command};
use config::Config;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(api_url) = args.api_url {
        config.api_url = api_url;
    }
    config.validate()?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("Starting beltwatch capture daemon");
            let app = App::new(config).await?;
            app.run().await
        }
        Command::Probe => cli::probe(&config).await,
        Command::ProcessVideo { video_path, out } => {
            cli::process_video(&config, &video_path, &out).await
        }
        Command::Status => cli::status(&config).await,
        Command::Historical { days } => cli::historical(&config, days).await,
    }
}
