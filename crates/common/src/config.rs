//! Endpoint configuration types and loading
//!
//! Config precedence: env vars > config file > defaults.
//! The access token is loaded from the ACROLINX_ACCESS_TOKEN env var or
//! `access_token_file`, never stored in the TOML directly.

use crate::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when neither `--config` nor ACROLINX_CONFIG is set.
pub const DEFAULT_CONFIG_PATH: &str = "acrolinx.toml";

/// Which header scheme carries the access token.
///
/// `AcrolinxOne` sends `Authorization: Bearer <token>`. `AcrolinxCore` sends
/// the legacy `X-Acrolinx-*` headers (client signature, base URL, locale and
/// `X-Acrolinx-Auth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    #[default]
    AcrolinxOne,
    AcrolinxCore,
}

/// Identification of the integration talking to the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInformation {
    /// Signature issued after integration certification
    pub signature: String,
    /// `major.minor.patch.build`
    pub version: String,
    #[serde(default)]
    pub integration: IntegrationDetails,
}

/// Optional details attached to telemetry as labels.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntegrationDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sidebar_version: Option<String>,
}

/// Extra header sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

/// Batching settings for shipping client logs to the integration service.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub enable_cloud_logging: bool,
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Lowest entry type that is buffered: debug, info, warning or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enable_cloud_logging: false,
            app_name: default_app_name(),
            batch_size: default_batch_size(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

/// Everything needed to talk to one Acrolinx platform.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub acrolinx_url: String,
    pub client: ClientInformation,
    #[serde(default)]
    pub client_locale: Option<String>,
    #[serde(default)]
    pub service_type: ServiceType,
    /// Log every request and response status at info level
    #[serde(default)]
    pub enable_http_logging: bool,
    /// Keep and resend cookies across requests
    #[serde(default)]
    pub cors_with_credentials: bool,
    /// Ask the integration service whether telemetry is wanted
    #[serde(default = "default_true")]
    pub enable_telemetry: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
    /// Path to a file containing an access token (alternative to ACROLINX_ACCESS_TOKEN)
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

fn default_app_name() -> String {
    "acrolinx-client".into()
}

fn default_batch_size() -> usize {
    50
}

fn default_dispatch_interval_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_log_level() -> String {
    "info".into()
}

impl EndpointConfig {
    /// Build a configuration in code, with every optional setting at its default.
    pub fn new(
        acrolinx_url: impl Into<String>,
        signature: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            acrolinx_url: normalize_url(&acrolinx_url.into()),
            client: ClientInformation {
                signature: signature.into(),
                version: version.into(),
                integration: IntegrationDetails::default(),
            },
            client_locale: None,
            service_type: ServiceType::default(),
            enable_http_logging: false,
            cors_with_credentials: false,
            enable_telemetry: true,
            timeout_secs: default_timeout(),
            headers: Vec::new(),
            logging: LoggingSettings::default(),
            access_token: None,
            access_token_file: None,
        }
    }

    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// ACROLINX_URL replaces `acrolinx_url`. Access token resolution order:
    /// 1. ACROLINX_ACCESS_TOKEN env var
    /// 2. access_token_file path from config
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: EndpointConfig = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("ACROLINX_URL") {
            config.acrolinx_url = url;
        }
        config.acrolinx_url = normalize_url(&config.acrolinx_url);

        if let Ok(token) = std::env::var("ACROLINX_ACCESS_TOKEN") {
            config.access_token = Some(Secret::new(token));
        } else if let Some(ref token_file) = config.access_token_file {
            let token =
                std::fs::read_to_string(token_file).map_err(|source| crate::Error::TokenFile {
                    path: token_file.clone(),
                    source,
                })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.access_token = Some(Secret::new(token));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot work with.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.acrolinx_url.starts_with("http://") && !self.acrolinx_url.starts_with("https://")
        {
            return Err(crate::Error::InvalidSetting {
                field: "acrolinx_url",
                reason: format!("must start with http:// or https://, got: {}", self.acrolinx_url),
            });
        }

        if self.client.signature.trim().is_empty() {
            return Err(crate::Error::InvalidSetting {
                field: "client.signature",
                reason: "must not be empty".into(),
            });
        }

        if self.timeout_secs == 0 {
            return Err(crate::Error::InvalidSetting {
                field: "timeout_secs",
                reason: "must be greater than 0".into(),
            });
        }

        if self.logging.batch_size == 0 {
            return Err(crate::Error::InvalidSetting {
                field: "logging.batch_size",
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or ACROLINX_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("ACROLINX_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

/// Trim whitespace and a single trailing slash from the platform URL.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    url.strip_suffix('/').unwrap_or(url).to_owned()
}
