//! Client for the integration service (`/int-service/api/v1`)
//!
//! Always authenticates with a bearer token, whatever the endpoint's
//! configured service type.

use crate::log_buffer::LogEntry;
use acrolinx_http::{HttpTransport, RequestOptions, Result, ServiceType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const INT_SERVICE_BASE_PATH: &str = "/int-service/api/v1";

/// Feature switches the platform enables per tenant. Both default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationServiceConfig {
    pub activate_get_suggestion_replacement: bool,
    pub telemetry_enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogBatch<'a> {
    app_name: &'a str,
    logs: &'a [LogEntry],
}

#[derive(Clone)]
pub struct IntService {
    transport: HttpTransport,
}

impl IntService {
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }

    pub async fn get_config(&self, access_token: &str) -> Result<IntegrationServiceConfig> {
        self.transport
            .get_json_from_path(
                &full_path("/config"),
                Some(access_token),
                &RequestOptions::service(ServiceType::AcrolinxOne),
            )
            .await
    }

    pub async fn send_logs(
        &self,
        access_token: &str,
        app_name: &str,
        logs: &[LogEntry],
    ) -> Result<Value> {
        debug!(count = logs.len(), "sending log batch");
        self.transport
            .post_json_to_path(
                &full_path("/logs"),
                &LogBatch { app_name, logs },
                Some(access_token),
                &RequestOptions::service(ServiceType::AcrolinxOne),
            )
            .await
    }
}

fn full_path(path: &str) -> String {
    format!("{INT_SERVICE_BASE_PATH}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_buffer::LogEntryType;
    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use common::{EndpointConfig, ServiceType};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn spawn_server(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn int_service(url: &str) -> IntService {
        let mut config = EndpointConfig::new(url, "SW50ZWdyYXRpb25EZXZlbG9wbWVudERlbW9Pbmx5", "1.0");
        config.service_type = ServiceType::AcrolinxCore;
        IntService::new(HttpTransport::new(config).unwrap())
    }

    #[tokio::test]
    async fn config_uses_bearer_even_for_core_endpoints() {
        let app = Router::new().route(
            "/int-service/api/v1/config",
            get(|headers: HeaderMap| async move {
                let bearer = headers
                    .get("authorization")
                    .is_some_and(|v| v == "Bearer token-1");
                let legacy = headers.contains_key("x-acrolinx-auth");
                Json(json!({"telemetryEnabled": bearer && !legacy}))
            }),
        );
        let url = spawn_server(app).await;

        let config = int_service(&url).get_config("token-1").await.unwrap();
        assert!(config.telemetry_enabled);
        assert!(!config.activate_get_suggestion_replacement);
    }

    #[tokio::test]
    async fn send_logs_posts_app_name_and_entries() {
        let received = Arc::new(Mutex::new(Value::Null));
        let sink = received.clone();
        let app = Router::new().route(
            "/int-service/api/v1/logs",
            post(move |Json(body): Json<Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = body;
                    Json(json!({}))
                }
            }),
        );
        let url = spawn_server(app).await;
        let logs = vec![LogEntry::new(LogEntryType::Warning, "slow check")];

        int_service(&url)
            .send_logs("token-1", "word-addin", &logs)
            .await
            .unwrap();

        let body = received.lock().unwrap().clone();
        assert_eq!(body["appName"], "word-addin");
        assert_eq!(body["logs"][0]["type"], "warning");
        assert_eq!(body["logs"][0]["message"], "slow check");
        assert_eq!(body["logs"][0]["details"], json!([]));
    }
}
