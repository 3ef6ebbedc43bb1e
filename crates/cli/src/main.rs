//! # Whisker Server
//!
//! Entry point: loads the server's TOML configuration, binds the
//! configured transport backend(s) to the server task layer, and runs
//! until a shutdown signal arrives.

mod cli;
mod error;
mod server;

use anyhow::Result;
use clap::Parser;
use config_loader::{ConfigLoader, LogFormat, WhiskerConfig};
use tracing::{error, info};
use tracing_subscriber::Layer;

use cli::Cli;
use error::CliError;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if !cli.config.exists() {
        return Err(CliError::ConfigNotFound {
            path: cli.config.display().to_string(),
        }
        .into());
    }
    let config = ConfigLoader::load_from_path(&cli.config)
        .map_err(|error| CliError::Other(anyhow::Error::from(error)))?;

    init_logging(config.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        resource_dir = %config.resource_dir,
        "whisker-server starting"
    );

    if let Some(port) = config.metrics_port {
        observability::init_metrics_only(port)?;
    }

    let result = run(&config).await;
    if let Err(ref error) = result {
        error!(%error, "whisker-server exited with an error");
    }
    result
}

async fn run(config: &WhiskerConfig) -> Result<()> {
    let (_tasks, backends) = server::build(config).await?;

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping transport backends");
    backends.stop().await;

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initializes tracing from the config file's log format rather than a CLI
/// flag, since flag parsing beyond `--config` is out of scope here.
fn init_logging(format: LogFormat) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    Ok(())
}
