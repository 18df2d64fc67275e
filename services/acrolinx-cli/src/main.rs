//! Acrolinx command line client
//!
//! Signs in, lists capabilities and checks files against an Acrolinx
//! platform configured in `acrolinx.toml` (or `--config`, or ACROLINX_CONFIG).

mod cli;
mod commands;
mod metrics;

use anyhow::{Context, Result};
use common::EndpointConfig;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use acrolinx_endpoint::AcrolinxEndpoint;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = Cli::parse(&args)?;

    // Install before the endpoint exists so the first check is counted
    let prometheus = if cli.metrics {
        Some(metrics::install_recorder()?)
    } else {
        None
    };

    let config_path = EndpointConfig::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = EndpointConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        url = %config.acrolinx_url,
        service_type = ?config.service_type,
        telemetry = config.enable_telemetry,
        "configuration loaded"
    );

    let endpoint = AcrolinxEndpoint::new(config).context("failed to create endpoint")?;

    let started = Instant::now();
    let result = commands::run(&endpoint, &cli.command).await;
    metrics::record_command(
        cli.command.name(),
        result.is_ok(),
        started.elapsed().as_secs_f64(),
    );

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }
    result
}
