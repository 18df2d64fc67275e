//! Checks: submission, polling and cancellation
//!
//! A check runs asynchronously on the platform. Submitting returns either a
//! running operation with a result link (and usually a cancel link) or, for
//! small documents, the finished result. The poll loop follows the server's
//! `retryAfter` between polls and stops on the first of: result, error,
//! caller timeout, or cancellation.
//!
//! Cancellation is cooperative. It is detected after submission, after every
//! poll and after every wait; the server-side cancel request is sent at most
//! once per operation, and the loop always ends with `CheckCancelled`.

use crate::capabilities::{CheckType, ContentEncoding, Goal, ReportType};
use crate::document::{DocumentDescriptor, DocumentDescriptorRequest};
use crate::endpoint::AcrolinxEndpoint;
use crate::extraction::{AnalysisRequest, ExtractionResult};
use crate::user::KeyValuePair;
use acrolinx_auth::Addon;
use acrolinx_http::headers::HEADER_X_ACROLINX_APP_SIGNATURE;
use acrolinx_http::poll::classify_poll_response;
use acrolinx_http::{
    AcrolinxError, ErrorType, HttpRequest, PollOutcome, Progress, RequestOptions, Result,
};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CHECK_PATH: &str = "/api/v1/checking/checks";
pub const ANALYSIS_PATH: &str = "/api/v1/apps/analyses";

// -- Request --------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRange {
    pub begin: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalContentField {
    pub id: String,
    pub content: String,
}

/// Content referenced from, but not contained in, the checked document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_replacements: Option<Vec<ExternalContentField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<ExternalContentField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dita_references: Option<Vec<ExternalContentField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xinclude_references: Option<Vec<ExternalContentField>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftwareComponent {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Software the check was sent from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<SoftwareComponent>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_profile_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_types: Option<Vec<ReportType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_type: Option<CheckType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<Vec<String>>,
    /// Check only these ranges of the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_check_ranges: Option<Vec<CheckRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_options: Option<CheckOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentDescriptorRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_content: Option<ExternalContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Integration>,
}

impl CheckRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Request for binary content, sent base64-encoded.
    pub fn base64(content: &[u8]) -> Self {
        Self {
            content: base64::engine::general_purpose::STANDARD.encode(content),
            content_encoding: Some(ContentEncoding::Base64),
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.check_options = Some(options);
        self
    }

    pub fn with_document(mut self, document: DocumentDescriptorRequest) -> Self {
        self.document = Some(document);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSearchRequest {
    pub request_id: String,
    pub target: String,
    pub phrase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSuggestion {
    pub preferred_phrase: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSearchResponse {
    pub request_id: String,
    #[serde(default)]
    pub results: Vec<LiveSuggestion>,
}

// -- Result ---------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentQualityStatus {
    Red,
    Yellow,
    Green,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreByGoal {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Quality {
    pub score: f64,
    pub status: DocumentQualityStatus,
    pub scores_by_goal: Option<Vec<ScoreByGoal>>,
    pub metrics: Option<Vec<Metric>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counts {
    pub sentences: u64,
    pub words: u64,
    pub issues: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalWithIssueCount {
    #[serde(flatten)]
    pub goal: Goal,
    #[serde(default)]
    pub issues: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueHashes {
    pub issue: String,
    pub environment: String,
    pub index: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalContentMatch {
    pub id: String,
    #[serde(rename = "type")]
    pub match_type: String,
    pub original_begin: usize,
    pub original_end: usize,
    pub external_content_matches: Option<Vec<ExternalContentMatch>>,
}

/// Where an issue sits, in both extracted and original text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Match {
    pub extracted_part: String,
    pub extracted_begin: usize,
    pub extracted_end: usize,
    pub original_part: String,
    pub original_begin: usize,
    pub original_end: usize,
    pub external_content_matches: Option<Vec<ExternalContentMatch>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionalInformation {
    pub hashes: IssueHashes,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionIconId {
    Admitted,
    Preferred,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Suggestion {
    pub surface: String,
    pub group_id: String,
    pub icon_id: Option<SuggestionIconId>,
    /// One replacement per match; `None` leaves that match unchanged.
    pub replacements: Vec<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueLocation {
    pub location_id: String,
    pub display_name: String,
    pub values: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Analytical,
    Actionable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewriteContextPart {
    pub source_id: Option<String>,
    pub source_type: Option<String>,
    pub begin: usize,
    pub end: usize,
    pub external_content: Option<Vec<RewriteContextPart>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Issue {
    pub internal_name: String,
    pub display_name_html: String,
    pub guidance_html: String,
    pub display_surface: String,
    pub positional_information: PositionalInformation,
    pub read_only: bool,
    pub issue_locations: Vec<IssueLocation>,
    pub suggestions: Vec<Suggestion>,
    /// `help`, `addToDictionary`, `termContribution`, ...
    pub links: HashMap<String, String>,
    pub can_add_to_dictionary: bool,
    pub sub_issues: Vec<Issue>,
    pub goal_id: String,
    pub issue_type: Option<IssueType>,
    pub scoring: Option<String>,
    pub ai_rephrase_hint: Option<String>,
    pub ai_rewrite_context: Option<Vec<RewriteContextPart>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Keyword {
    pub keyword: String,
    pub sort_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordWarning {
    #[serde(rename = "type")]
    pub warning_type: String,
    pub severity: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscoveredKeyword {
    pub keyword: String,
    pub sort_key: Option<String>,
    pub density: f64,
    pub count: u64,
    pub prominence: f64,
    pub warnings: Option<Vec<KeywordWarning>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordsSectionLinks {
    pub get_target_keywords: Option<String>,
    pub put_target_keywords: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordsSection {
    pub links: KeywordsSectionLinks,
    pub discovered: Vec<DiscoveredKeyword>,
    pub target: Vec<Keyword>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Report {
    pub link: String,
    pub link_authenticated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    #[serde(default)]
    pub check_options: CheckOptions,
    #[serde(default)]
    pub dictionary_scopes: Vec<crate::dictionary::DictionaryScope>,
    #[serde(default)]
    pub document: Option<DocumentDescriptor>,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub counts: Counts,
    #[serde(default)]
    pub goals: Vec<GoalWithIssueCount>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Absent for partial checks.
    #[serde(default)]
    pub keywords: Option<KeywordsSection>,
    /// Keyed by report type, see `ReportType::key`.
    #[serde(default)]
    pub reports: HashMap<String, Report>,
    #[serde(default)]
    pub embed: Option<Vec<KeyValuePair>>,
    #[serde(default)]
    pub addons: Option<Vec<Addon>>,
}

impl CheckResult {
    pub fn report(&self, report_type: ReportType) -> Option<&Report> {
        self.reports.get(report_type.key())
    }

    pub fn term_harvesting_report(&self) -> Option<&Report> {
        self.report(ReportType::TermHarvesting)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestedTermOccurrence {
    pub context: String,
    pub display_context_html: String,
    pub positional_information: PositionalInformation,
    pub locations: Vec<IssueLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestedTerm {
    pub display_surface: String,
    pub occurrences: Vec<HarvestedTermOccurrence>,
    pub links: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermHarvestingReport {
    pub terms: Vec<HarvestedTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatedReport {
    pub report_type: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatedReportLinkResult {
    pub reports: Vec<AggregatedReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentAnalysisDashboardLink {
    pub link_type: String,
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ContentAnalysisDashboardResult {
    pub(crate) links: Vec<ContentAnalysisDashboardLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelCheckResponseData {
    pub id: String,
}

// -- Operations -----------------------------------------------------------

/// Id and links of an operation running on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncOperationHandle {
    pub id: String,
    pub result_link: String,
    pub cancel_link: Option<String>,
}

impl AsyncOperationHandle {
    /// Parse `{data: {id}, links: {result, cancel?}}`. `None` without a result link.
    fn from_started(body: &Value) -> Option<Self> {
        let result_link = body
            .pointer("/links/result")
            .and_then(Value::as_str)
            .filter(|l| !l.is_empty())?;
        Some(Self {
            id: body
                .pointer("/data/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            result_link: result_link.to_owned(),
            cancel_link: body
                .pointer("/links/cancel")
                .and_then(Value::as_str)
                .filter(|l| !l.is_empty())
                .map(str::to_owned),
        })
    }
}

/// Shared state of one running operation. Clones refer to the same operation.
#[derive(Clone)]
pub(crate) struct RunningOperation {
    pub(crate) handle: AsyncOperationHandle,
    cancellation: CancellationToken,
    cancel_requested_on_server: Arc<AtomicBool>,
    /// Extra headers repeated on every poll and on the cancel request.
    request_options: RequestOptions,
}

impl RunningOperation {
    fn new(
        handle: AsyncOperationHandle,
        cancellation: CancellationToken,
        request_options: RequestOptions,
    ) -> Self {
        Self {
            handle,
            cancellation,
            cancel_requested_on_server: Arc::new(AtomicBool::new(false)),
            request_options,
        }
    }
}

/// A submitted check that has not finished yet.
#[derive(Clone)]
pub struct CheckSession {
    operation: RunningOperation,
    request: Arc<CheckRequest>,
}

impl CheckSession {
    pub fn id(&self) -> &str {
        &self.operation.handle.id
    }

    pub fn handle(&self) -> &AsyncOperationHandle {
        &self.operation.handle
    }

    pub fn request(&self) -> &CheckRequest {
        &self.request
    }

    /// Token that cancels this check. Cancelling it from any task stops
    /// `check_and_get_result` at its next suspension point.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.operation.cancellation.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.operation.cancellation.is_cancelled()
    }
}

impl fmt::Debug for CheckSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSession")
            .field("handle", &self.operation.handle)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Outcome of submitting a check.
#[derive(Debug, Clone)]
pub enum CheckSubmission {
    Started(CheckSession),
    /// The platform answered with the result right away.
    Completed(Box<CheckResult>),
}

impl CheckSubmission {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

pub type ProgressCallback = Box<dyn FnMut(&Progress) + Send>;

/// Options for `check_and_get_result` and `analyze_and_poll`.
#[derive(Default)]
pub struct CheckAndGetResultOptions {
    pub on_progress: Option<ProgressCallback>,
    /// Give up with `CheckTimedOut` once this much time has passed.
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
}

impl CheckAndGetResultOptions {
    pub fn on_progress(mut self, callback: impl FnMut(&Progress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl fmt::Debug for CheckAndGetResultOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckAndGetResultOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field("timeout", &self.timeout)
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl AcrolinxEndpoint {
    /// Submit a check. Does not wait for the result.
    pub async fn check(&self, access_token: &str, request: &CheckRequest) -> Result<CheckSubmission> {
        self.submit_check(access_token, request, CancellationToken::new())
            .await
    }

    async fn submit_check(
        &self,
        access_token: &str,
        request: &CheckRequest,
        cancellation: CancellationToken,
    ) -> Result<CheckSubmission> {
        if let Some(instruments) = self.instruments(access_token).await {
            instruments.record_check_requested();
        }

        let body: Value = self
            .transport()
            .post_json_to_path(CHECK_PATH, request, Some(access_token), &RequestOptions::default())
            .await?;

        if let Some(handle) = AsyncOperationHandle::from_started(&body) {
            info!(check_id = %handle.id, "check submitted");
            return Ok(CheckSubmission::Started(CheckSession {
                operation: RunningOperation::new(handle, cancellation, RequestOptions::default()),
                request: Arc::new(request.clone()),
            }));
        }

        let http_request = HttpRequest::new("POST", self.transport().url_of_path(CHECK_PATH));
        let result = body
            .get("data")
            .filter(|d| d.is_object())
            .cloned()
            .ok_or_else(|| {
                AcrolinxError::invalid_json(
                    Some(http_request.clone()),
                    "check response has neither a result link nor a result",
                )
            })
            .and_then(|data| {
                serde_json::from_value::<CheckResult>(data).map_err(|e| {
                    AcrolinxError::invalid_json(Some(http_request), format!("invalid check result: {e}"))
                })
            })?;
        debug!(check_id = %result.id, "check completed on submission");
        Ok(CheckSubmission::Completed(Box::new(result)))
    }

    /// Poll a running check once.
    pub async fn poll_for_check_result(
        &self,
        access_token: &str,
        session: &CheckSession,
    ) -> Result<PollOutcome<CheckResult>> {
        let operation = &session.operation;
        self.ensure_not_cancelled(access_token, operation).await?;
        let outcome = self
            .poll_operation(access_token, operation, &operation.handle.result_link)
            .await?;
        self.ensure_not_cancelled(access_token, operation).await?;
        Ok(outcome)
    }

    /// Cancel a check. Only the first call for a session reaches the server;
    /// later calls return `Ok(None)`.
    pub async fn cancel_check(
        &self,
        access_token: &str,
        session: &CheckSession,
    ) -> Result<Option<CancelCheckResponseData>> {
        let operation = &session.operation;
        operation.cancellation.cancel();
        let Some(cancel_link) = claim_server_cancel(operation) else {
            return Ok(None);
        };
        let response: acrolinx_http::ApiResponse<CancelCheckResponseData> = self
            .transport()
            .delete_json(cancel_link, Some(access_token), &operation.request_options)
            .await?;
        info!(check_id = %operation.handle.id, "check cancelled");
        Ok(Some(response.data))
    }

    /// Submit a check and poll until it finishes.
    pub async fn check_and_get_result(
        &self,
        access_token: &str,
        request: &CheckRequest,
        options: CheckAndGetResultOptions,
    ) -> Result<CheckResult> {
        let started = self.clock().now();
        let cancellation = options.cancellation.clone().unwrap_or_default();
        match self
            .submit_check(access_token, request, cancellation)
            .await?
        {
            CheckSubmission::Completed(result) => Ok(*result),
            CheckSubmission::Started(session) => {
                self.run_poll_loop(access_token, &session.operation, options, started)
                    .await
            }
        }
    }

    /// Start a text extraction for an add-on app and poll until it finishes.
    pub async fn analyze_and_poll(
        &self,
        access_token: &str,
        request: &AnalysisRequest,
        options: CheckAndGetResultOptions,
    ) -> Result<ExtractionResult> {
        let started = self.clock().now();
        let request_options = RequestOptions::default()
            .header(HEADER_X_ACROLINX_APP_SIGNATURE, request.app_signature.clone());
        let body: Value = self
            .transport()
            .post_json_to_path(ANALYSIS_PATH, request, Some(access_token), &request_options)
            .await?;
        let handle = AsyncOperationHandle::from_started(&body).ok_or_else(|| {
            AcrolinxError::invalid_json(
                Some(HttpRequest::new("POST", self.transport().url_of_path(ANALYSIS_PATH))),
                "analysis response without a result link",
            )
        })?;
        debug!(analysis_id = %handle.id, "analysis submitted");

        let cancellation = options.cancellation.clone().unwrap_or_default();
        let operation = RunningOperation::new(handle, cancellation, request_options);
        self.run_poll_loop(access_token, &operation, options, started)
            .await
    }

    async fn run_poll_loop<T: DeserializeOwned>(
        &self,
        access_token: &str,
        operation: &RunningOperation,
        mut options: CheckAndGetResultOptions,
        started: std::time::Instant,
    ) -> Result<T> {
        self.ensure_not_cancelled(access_token, operation).await?;

        let mut poll_link = operation.handle.result_link.clone();
        loop {
            if let Some(timeout) = options.timeout {
                let elapsed = self.clock().now().saturating_duration_since(started);
                if elapsed >= timeout {
                    warn!(
                        id = %operation.handle.id,
                        elapsed_secs = elapsed.as_secs_f64(),
                        "operation timed out"
                    );
                    self.cancel_on_server_once(access_token, operation).await;
                    return Err(AcrolinxError::check_timed_out(elapsed, timeout));
                }
            }

            let outcome = self
                .poll_operation::<T>(access_token, operation, &poll_link)
                .await?;
            self.ensure_not_cancelled(access_token, operation).await?;

            let progress = match outcome {
                PollOutcome::Success(result) => return Ok(result),
                PollOutcome::Progress(progress) => progress,
            };
            if let Some(on_progress) = options.on_progress.as_mut() {
                on_progress(&progress);
            }

            debug!(
                id = %operation.handle.id,
                percent = progress.percent,
                retry_after_secs = progress.retry_after.as_secs_f64(),
                "operation in progress"
            );
            // Never sleep past the caller's deadline.
            let wait = options.timeout.map_or(progress.retry_after, |timeout| {
                let elapsed = self.clock().now().saturating_duration_since(started);
                progress.retry_after.min(timeout.saturating_sub(elapsed))
            });
            tokio::select! {
                _ = self.clock().sleep(wait) => {}
                _ = operation.cancellation.cancelled() => {}
            }
            self.ensure_not_cancelled(access_token, operation).await?;
            poll_link = progress.poll_link;
        }
    }

    async fn poll_operation<T: DeserializeOwned>(
        &self,
        access_token: &str,
        operation: &RunningOperation,
        link: &str,
    ) -> Result<PollOutcome<T>> {
        let body: Value = self
            .transport()
            .get_json(link, Some(access_token), &operation.request_options)
            .await?;
        classify_poll_response(&HttpRequest::new("GET", link), body, link)
    }

    async fn ensure_not_cancelled(&self, access_token: &str, operation: &RunningOperation) -> Result<()> {
        if !operation.cancellation.is_cancelled() {
            return Ok(());
        }
        self.cancel_on_server_once(access_token, operation).await;
        Err(AcrolinxError::check_cancelled())
    }

    /// Ask the server to stop the operation. Failures are logged, not returned.
    async fn cancel_on_server_once(&self, access_token: &str, operation: &RunningOperation) {
        let Some(cancel_link) = claim_server_cancel(operation) else {
            return;
        };
        let result: Result<Value> = self
            .transport()
            .delete_json(cancel_link, Some(access_token), &operation.request_options)
            .await;
        match result {
            Ok(_) => info!(id = %operation.handle.id, "operation cancelled on server"),
            Err(e) if e.error_type == ErrorType::CheckCancelled => {
                debug!(id = %operation.handle.id, "operation already cancelled on server");
            }
            Err(e) => warn!(id = %operation.handle.id, error = %e, "server-side cancel failed"),
        }
    }
}

/// The cancel link, the first time only.
fn claim_server_cancel(operation: &RunningOperation) -> Option<&str> {
    let link = operation.handle.cancel_link.as_deref()?;
    if operation
        .cancel_requested_on_server
        .swap(true, Ordering::SeqCst)
    {
        return None;
    }
    Some(link)
}
