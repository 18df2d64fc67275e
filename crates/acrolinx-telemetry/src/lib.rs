//! Telemetry for Acrolinx integrations
//!
//! - `int_service`: feature switches and log upload on the integration service
//! - `instrumentation`: platform-gated usage metrics (`metrics` crate)
//! - `log_buffer`: batched, retried shipping of integration log entries
//! - `error_id`: short support reference ids attached to error entries

pub mod error_id;
pub mod instrumentation;
pub mod int_service;
pub mod log_buffer;

pub use error_id::ErrorIdGenerator;
pub use instrumentation::{InstrumentationRegistry, Instruments, TelemetryKey};
pub use int_service::{INT_SERVICE_BASE_PATH, IntService, IntegrationServiceConfig};
pub use log_buffer::{
    IntServiceSink, LogBuffer, LogBufferConfig, LogEntry, LogEntryType, LogSink,
};
