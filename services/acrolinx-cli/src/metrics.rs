//! Prometheus exposition of the client's usage metrics
//!
//! The recorder is installed only when `--metrics` is given; the rendered
//! text is printed to stderr when the command finishes.

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// AI suggestions take from well under a second to about a minute.
const SUGGESTION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("acrolinx_suggestion_response_seconds".to_string()),
            SUGGESTION_BUCKETS,
        )
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder globally and return a handle for rendering.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record how long a CLI command took, labelled by command name and outcome.
pub fn record_command(command: &str, ok: bool, duration_secs: f64) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("acrolinx_cli_commands_total", "command" => command.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("acrolinx_cli_command_duration_seconds", "command" => command.to_string())
        .record(duration_secs);
}
