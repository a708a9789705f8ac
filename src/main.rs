//! CLI for storecast
//!
//! Subcommands:
//! - `serve`: run the HTTP server
//! - `check-config`: print the merged configuration and exit

use clap::Parser;
use storecast::config::{Settings, load_config};
use storecast::transport::{AppState, start_http_server};
use storecast::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "storecast")]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Overrides `server.host`
        #[arg(long)]
        host: Option<String>,
        /// Overrides `server.port`
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let mut config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log.level);

    match cmd {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Err(e) = run_server(config).await {
                error!("Server failed: {e}");
                std::process::exit(1);
            }
        }
        Command::CheckConfig => println!("{config:#?}"),
    }
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(&config)?;
    info!(
        "Serving {} stores, snapshot interval {}s",
        state.catalog.stores().len(),
        config.broker.publish_interval_secs
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
        }
    };
    start_http_server(addr, state, shutdown).await?;

    info!("Server stopped");
    Ok(())
}
