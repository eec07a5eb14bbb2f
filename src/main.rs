// Magpie - agent session pattern harvester
// Main entry point

use clap::Parser;
use tracing_subscriber::EnvFilter;

use magpie::cli::Cli;
use magpie::config::load_settings;
use magpie::pipeline;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("magpie: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = pipeline::run(&cli, &settings).await {
        tracing::error!("run failed: {:#}", e);
        eprintln!("magpie: {}", e);
        std::process::exit(e.exit_code());
    }
}
