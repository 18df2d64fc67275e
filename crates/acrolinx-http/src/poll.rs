//! Classification of asynchronous operation responses
//!
//! Long-running platform operations answer a poll with either
//! `{progress: {...}, links: {poll}}` while still running, or
//! `{data: ..., links: {...}}` once finished.

use crate::error::{AcrolinxError, HttpRequest, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// `{data, links}` envelope used by every successful platform response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiResponse<D, L = Value> {
    pub data: D,
    #[serde(default)]
    pub links: L,
}

/// Progress report of a still-running operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: f64,
    pub message: String,
    /// Minimum wait before the next poll. Never negative.
    pub retry_after: Duration,
    /// Link to poll next. Falls back to the link that was just polled.
    pub poll_link: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProgressBody {
    percent: f64,
    message: String,
    retry_after: f64,
}

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Progress(Progress),
    Success(T),
}

impl<T> PollOutcome<T> {
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::Progress(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PollOutcome<U> {
        match self {
            Self::Progress(p) => PollOutcome::Progress(p),
            Self::Success(v) => PollOutcome::Success(f(v)),
        }
    }
}

/// Classify a poll response body. `polled_link` is the URL that produced it.
pub fn classify_poll_response<T: DeserializeOwned>(
    request: &HttpRequest,
    body: Value,
    polled_link: &str,
) -> Result<PollOutcome<T>> {
    if let Some(progress) = body.get("progress").filter(|p| p.is_object()) {
        let parsed: ProgressBody = serde_json::from_value(progress.clone()).map_err(|e| {
            AcrolinxError::invalid_json(Some(request.clone()), format!("invalid progress: {e}"))
        })?;
        let poll_link = body
            .pointer("/links/poll")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())
            .unwrap_or(polled_link)
            .to_owned();
        return Ok(PollOutcome::Progress(Progress {
            percent: parsed.percent,
            message: parsed.message,
            retry_after: retry_after_from_secs(parsed.retry_after),
            poll_link,
        }));
    }

    let envelope: ApiResponse<T> = serde_json::from_value(body).map_err(|e| {
        AcrolinxError::invalid_json(Some(request.clone()), format!("invalid result: {e}"))
    })?;
    Ok(PollOutcome::Success(envelope.data))
}

/// Seconds from the wire to a non-negative `Duration`.
pub fn retry_after_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}
