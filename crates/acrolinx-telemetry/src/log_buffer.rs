//! Batched log shipping to the integration service
//!
//! Entries are buffered and sent in batches. An error entry or a full batch
//! flushes immediately; otherwise a single timer flushes what has
//! accumulated. Failed batches go back to the front of the buffer and are
//! retried with a growing, capped delay, then discarded after `max_retries`.
//!
//! `log` spawns onto the current Tokio runtime and must be called from
//! within one.

use crate::error_id::ErrorIdGenerator;
use crate::int_service::IntService;
use acrolinx_http::Result;
use common::{LoggingSettings, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEntryType {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogEntryType {
    /// Parse a configured level. Unknown names yield `None` (no filtering).
    pub fn parse(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "type")]
    pub entry_type: LogEntryType,
    pub message: String,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl LogEntry {
    pub fn new(entry_type: LogEntryType, message: impl Into<String>) -> Self {
        Self {
            entry_type,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.details.push(detail);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogBufferConfig {
    pub batch_size: usize,
    pub dispatch_interval: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Entries below this level are dropped. `None` keeps everything.
    pub log_level: Option<LogEntryType>,
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self::from(&LoggingSettings::default())
    }
}

impl From<&LoggingSettings> for LogBufferConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            batch_size: settings.batch_size.max(1),
            dispatch_interval: Duration::from_millis(settings.dispatch_interval_ms),
            max_retries: settings.max_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            log_level: LogEntryType::parse(&settings.log_level),
        }
    }
}

impl LogBufferConfig {
    /// `min(dispatch_interval * 2^retries, max_retries * retry_delay)`
    fn adaptive_delay(&self, retries: u32) -> Duration {
        let grown = self
            .dispatch_interval
            .saturating_mul(2u32.saturating_pow(retries));
        grown.min(self.retry_delay.saturating_mul(self.max_retries))
    }
}

/// Destination of flushed batches.
///
/// Uses `Pin<Box<dyn Future>>` instead of `async fn` so the buffer can hold
/// an `Arc<dyn LogSink>`.
pub trait LogSink: Send + Sync {
    fn send<'a>(
        &'a self,
        logs: &'a [LogEntry],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Ships batches to `/int-service/api/v1/logs`.
pub struct IntServiceSink {
    int_service: IntService,
    access_token: Secret<String>,
    app_name: String,
}

impl IntServiceSink {
    pub fn new(
        int_service: IntService,
        access_token: Secret<String>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            int_service,
            access_token,
            app_name: app_name.into(),
        }
    }
}

impl LogSink for IntServiceSink {
    fn send<'a>(
        &'a self,
        logs: &'a [LogEntry],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.int_service
                .send_logs(self.access_token.expose(), &self.app_name, logs)
                .await
                .map(|_| ())
        })
    }
}

#[derive(Default)]
struct BufferState {
    entries: Vec<LogEntry>,
    timer_scheduled: bool,
    retries: u32,
}

struct Inner {
    config: LogBufferConfig,
    sink: Arc<dyn LogSink>,
    state: Mutex<BufferState>,
    error_ids: Mutex<ErrorIdGenerator>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Cheap to clone; clones share one buffer.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Inner>,
}

impl LogBuffer {
    pub fn new(config: LogBufferConfig, sink: Arc<dyn LogSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                state: Mutex::new(BufferState::default()),
                error_ids: Mutex::new(ErrorIdGenerator::new()),
            }),
        }
    }

    pub fn config(&self) -> &LogBufferConfig {
        &self.inner.config
    }

    pub fn log(&self, entry: LogEntry) {
        if self
            .inner
            .config
            .log_level
            .is_some_and(|min| entry.entry_type < min)
        {
            return;
        }

        let is_error = entry.entry_type == LogEntryType::Error;
        let mut state = self.inner.lock();
        state.entries.push(entry);
        if is_error || state.entries.len() >= self.inner.config.batch_size {
            drop(state);
            spawn_flush(self.inner.clone(), None);
        } else if !state.timer_scheduled {
            state.timer_scheduled = true;
            let delay = self.inner.config.adaptive_delay(state.retries);
            drop(state);
            spawn_timer(self.inner.clone(), delay);
        }
    }

    /// Log an error with a fresh support reference id. Returns the id.
    pub fn log_error(&self, message: impl Into<String>, details: Vec<Value>) -> u32 {
        let id = self
            .inner
            .error_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .generate();
        let mut entry = LogEntry::new(LogEntryType::Error, message);
        entry.details = details;
        entry.details.push(json!({ "errorId": id.to_string() }));
        self.log(entry);
        id
    }

    /// Send everything buffered now, on this task.
    pub async fn flush(&self) {
        flush(self.inner.clone()).await;
    }

    /// Entries waiting to be sent.
    pub fn pending(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

fn spawn_timer(inner: Arc<Inner>, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        inner.lock().timer_scheduled = false;
        flush(inner).await;
    });
}

fn spawn_flush(inner: Arc<Inner>, delay: Option<Duration>) {
    tokio::spawn(async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        flush(inner).await;
    });
}

async fn flush(inner: Arc<Inner>) {
    let logs = {
        let mut state = inner.lock();
        if state.entries.is_empty() {
            return;
        }
        std::mem::take(&mut state.entries)
    };

    match inner.sink.send(&logs).await {
        Ok(()) => {
            debug!(count = logs.len(), "log batch delivered");
            inner.lock().retries = 0;
        }
        Err(e) => {
            let mut state = inner.lock();
            if state.retries < inner.config.max_retries {
                state.retries += 1;
                let delay = inner.config.adaptive_delay(state.retries);
                warn!(
                    error = %e,
                    attempt = state.retries,
                    retry_in_secs = delay.as_secs_f64(),
                    "log batch failed, will retry"
                );
                let newer = std::mem::replace(&mut state.entries, logs);
                state.entries.extend(newer);
                drop(state);
                spawn_flush(inner.clone(), Some(delay));
            } else {
                warn!(error = %e, discarded = logs.len(), "max retries reached, discarding logs");
                state.retries = 0;
            }
        }
    }
}
