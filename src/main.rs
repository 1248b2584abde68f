//! Horizon - physics assistant backend
//!
//! Main entry point for the Horizon service

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use horizon::cli::{Cli, Commands};
use horizon::config::{Config, LoggingConfig};
use horizon::error::HorizonError;
use horizon::providers::create_client;
use horizon::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(&config.logging, cli.verbose);
    tracing::debug!("Configuration loaded from {}", config_path);

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting Horizon on {}", config.server.bind);
            server::serve(&config).await?;
        }
        Commands::Ping => {
            let client = create_client(&config.provider)?;
            tracing::info!("Checking completion API with model {}", client.model());
            let report = client.test_connection().await;
            let rendered =
                serde_json::to_string_pretty(&report).map_err(HorizonError::Serialization)?;
            println!("{}", rendered);
            if let Some(error) = report.into_error() {
                return Err(HorizonError::Provider(error).into());
            }
        }
    }

    Ok(())
}

/// Initialize tracing subscriber
///
/// `RUST_LOG` wins over the configured level; `-v` raises the default to
/// debug.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let default_filter = if verbose {
        "horizon=debug,tower_http=debug".to_string()
    } else {
        logging.level.clone()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
