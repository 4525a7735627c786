//! Helios Terminology Server tool (hts)
//!
//! Loads CodeSystem and ValueSet resources into the terminology index and
//! answers search, `$lookup`, `$validate-code` and `$expand` from it.

mod commands;
mod config;

use anyhow::Context;
use clap::Parser;
use helios_terminology::TerminologyService;
use tracing::info;

use config::ServerConfig;

/// Initializes the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("helios_terminology={0},helios_hts={0}", level))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Opens the service, runs the command and shuts the service down, whether
/// or not the command succeeded.
fn run(config: &ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    let service = TerminologyService::open(
        &config.data_dir,
        config.store_config(),
        config.repository_config(),
    )?;

    let result = commands::execute(&service, &config.command);
    let shutdown = service.shutdown();

    let output = result?;
    shutdown?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_logging(&config.log_level);

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        data_dir = %config.data_dir.display(),
        version = helios_terminology::VERSION,
        "Starting Helios terminology tool"
    );

    run(&config)
}
