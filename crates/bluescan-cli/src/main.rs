//! bluescan CLI - Bluetooth discovery from the command line

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*};

use bluescan_bluez::SystemPlatform;
use bluescan_cli::{
    cli::{Cli, Commands},
    commands::CommandDispatcher,
    config::{AppConfig, ConfigOverrides},
    error::Result,
};
use bluescan_core::SimulatedPlatform;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration before logging so the config file can enable verbose output
    let config = load_configuration(&cli)?;

    // Initialize logging; the guard flushes the log file on exit
    let log_guard = setup_logging(&config)?;
    match &cli.config {
        Some(path) => info!("Loaded configuration from: {}", path),
        None => info!("Loaded configuration from defaults, files and environment"),
    }

    let command = cli.command();
    let result = if cli.simulate && command != Commands::Config {
        info!("Using simulated adapter");
        let platform = Arc::new(SimulatedPlatform::demo());
        CommandDispatcher::new(platform, config).execute(command).await
    } else {
        let platform = Arc::new(SystemPlatform::new(config.discovery.adapter.clone()));
        CommandDispatcher::new(platform, config).execute(command).await
    };

    if let Err(e) = result {
        error!("Command execution failed: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

/// Setup logging based on verbosity level, to stderr and optionally a file
fn setup_logging(config: &AppConfig) -> Result<Option<WorkerGuard>> {
    let log_level = if config.cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match config.log_appender()? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(log_level))
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
