//! Main entry point for the sponsored-call relay service.
//!
//! This binary verifies signed meta-transactions, forwards them to their
//! target contracts on the signer's behalf and settles relay fees. It uses
//! a modular architecture with pluggable implementations for storage,
//! accounts, targets, fee oracles and fee tokens.

use clap::Parser;
use relay_config::Config;
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the relay service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/relay.toml", env = "RELAY_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the relay service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the relay engine with all implementations
/// 5. Runs the engine and the API server until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started relay");

	let config_path = args
		.config
		.to_str()
		.ok_or_else(|| format!("Config path is not valid UTF-8: {}", args.config.display()))?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.relay.id);

	let relay = factory_registry::build_relay_from_config(config.clone()).await?;
	let relay = Arc::new(relay);

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let relay_task = relay.run();
			let api_task = server::start_server(api_config, Arc::clone(&relay));

			tokio::select! {
				result = relay_task => {
					tracing::info!("Relay finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		}
		None => {
			tracing::info!("Starting relay only");
			relay.run().await?;
		}
	}

	tracing::info!("Stopped relay");
	Ok(())
}
