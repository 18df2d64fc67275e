//! Shared types for the Acrolinx client workspace
//!
//! Holds the endpoint configuration every other crate is built from,
//! the redacting `Secret` wrapper used for tokens, and the configuration
//! error type.

mod config;
mod error;
mod secret;

pub use config::{
    ClientInformation, DEFAULT_CONFIG_PATH, EndpointConfig, HeaderInjection, IntegrationDetails,
    LoggingSettings, ServiceType,
};
pub use error::{Error, Result};
pub use secret::Secret;
