mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cuepoint_core::{
    bootstrap::{init_services, load_config},
    logging,
};

use server::CuepointServer;

#[derive(Parser, Debug)]
#[command(name = "cuepoint")]
#[command(about = "Cuepoint playback orchestration server", long_about = None)]
struct Args {
    /// Configuration file (YAML or TOML); defaults to ./config.yaml when present
    #[arg(long, env = "CUEPOINT_CONFIG_PATH")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration (fail fast on misconfigurations)
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Cuepoint server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Initialize services
    let services = init_services(&config)?;

    // 4. Run until shutdown
    CuepointServer::new(config, services).start().await
}
