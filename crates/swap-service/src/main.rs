use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swap_config::ConfigLoader;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod implementations;

#[derive(Parser)]
#[command(name = "swapd")]
#[command(about = "Swap trade-execution pipeline service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "SWAP_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the pipeline service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting swapd");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);

	let http_port = config.service.http_port;
	let engine = implementations::build_engine(config).context("Failed to build engine")?;
	let engine = Arc::new(engine);

	// Background gas polling keeps fee estimates fresh for every
	// configured chain.
	engine.start_polling();

	let server_engine = Arc::clone(&engine);
	let http_handle = tokio::spawn(async move { api::serve(server_engine, http_port).await });

	info!("swapd started");

	shutdown_signal().await;
	info!("Shutdown signal received, stopping");

	http_handle.abort();

	info!("swapd stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	implementations::validate_implementations(&config)
		.context("Implementation configuration invalid")?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("Quoter implementation: {}", config.quoter.implementation);
	info!("Gas oracle implementation: {}", config.gas.implementation);
	for chain in config.delivery.chains.keys() {
		info!("  Chain configured: {}", chain);
	}

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
