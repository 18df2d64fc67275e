//! Usage metrics, gated by the platform
//!
//! Instruments exist only when the integration service reports
//! `telemetryEnabled` for the signed-in user. The registry asks at most once
//! per platform/client combination, even when many callers race on first use,
//! and remembers the answer (including "disabled") until `reset`.
//!
//! Metrics:
//! - `acrolinx_check_requested_total` (counter)
//! - `acrolinx_suggestion_requested_total` (counter)
//! - `acrolinx_suggestion_response_seconds` (histogram)
//!
//! All carry `integration` and `sidebar_version` labels.

use crate::int_service::{IntService, IntegrationServiceConfig};
use common::{EndpointConfig, IntegrationDetails};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const UNKNOWN_LABEL: &str = "unknown";

/// Identifies one initialization: which platform, which client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TelemetryKey {
    pub acrolinx_url: String,
    pub signature: String,
    pub version: String,
}

impl TelemetryKey {
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            acrolinx_url: config.acrolinx_url.clone(),
            signature: config.client.signature.clone(),
            version: config.client.version.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instruments {
    integration: String,
    sidebar_version: String,
    settings: IntegrationServiceConfig,
}

impl Instruments {
    pub fn new(details: &IntegrationDetails, settings: IntegrationServiceConfig) -> Self {
        Self {
            integration: details.name.clone().unwrap_or_else(|| UNKNOWN_LABEL.to_owned()),
            sidebar_version: details
                .sidebar_version
                .clone()
                .unwrap_or_else(|| UNKNOWN_LABEL.to_owned()),
            settings,
        }
    }

    pub fn settings(&self) -> IntegrationServiceConfig {
        self.settings
    }

    pub fn record_check_requested(&self) {
        metrics::counter!(
            "acrolinx_check_requested_total",
            "integration" => self.integration.clone(),
            "sidebar_version" => self.sidebar_version.clone()
        )
        .increment(1);
    }

    pub fn record_suggestion_requested(&self) {
        metrics::counter!(
            "acrolinx_suggestion_requested_total",
            "integration" => self.integration.clone(),
            "sidebar_version" => self.sidebar_version.clone()
        )
        .increment(1);
    }

    pub fn record_suggestion_response_time(&self, elapsed: Duration) {
        metrics::histogram!(
            "acrolinx_suggestion_response_seconds",
            "integration" => self.integration.clone(),
            "sidebar_version" => self.sidebar_version.clone()
        )
        .record(elapsed.as_secs_f64());
    }
}

type Slot = Arc<OnceCell<Option<Arc<Instruments>>>>;

/// Create-or-fetch store for `Instruments`. Share one per process.
#[derive(Default)]
pub struct InstrumentationRegistry {
    slots: Mutex<HashMap<TelemetryKey, Slot>>,
}

impl InstrumentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instruments for this configuration, or `None` when telemetry is off.
    ///
    /// Concurrent first calls for the same key share a single request to the
    /// integration service. Failures to reach it count as "disabled".
    pub async fn get_instruments(
        &self,
        int_service: &IntService,
        config: &EndpointConfig,
        access_token: &str,
    ) -> Option<Arc<Instruments>> {
        if !config.enable_telemetry {
            return None;
        }

        let slot = self
            .lock()
            .entry(TelemetryKey::from_config(config))
            .or_default()
            .clone();

        slot.get_or_init(|| async {
            let settings = is_allowed(int_service, access_token).await?;
            info!(url = %config.acrolinx_url, "telemetry enabled");
            Some(Arc::new(Instruments::new(&config.client.integration, settings)))
        })
        .await
        .clone()
    }

    /// True once a decision for this configuration has been cached.
    pub fn is_initialized(&self, config: &EndpointConfig) -> bool {
        self.lock()
            .get(&TelemetryKey::from_config(config))
            .is_some_and(|slot| slot.initialized())
    }

    /// Forget every cached decision.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TelemetryKey, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn is_allowed(int_service: &IntService, access_token: &str) -> Option<IntegrationServiceConfig> {
    match int_service.get_config(access_token).await {
        Ok(settings) if settings.telemetry_enabled => Some(settings),
        Ok(_) => {
            debug!("telemetry disabled by platform");
            None
        }
        Err(e) => {
            warn!(error = %e, "integration service unavailable, telemetry disabled");
            None
        }
    }
}
