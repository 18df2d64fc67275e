//! Client for the Acrolinx platform
//!
//! `AcrolinxEndpoint` bundles one platform configuration with its HTTP
//! transport, poll clock and telemetry. Typical flow:
//!
//! 1. `sign_in_interactive()` (or the device grant) for an access token
//! 2. `get_checking_capabilities()` to pick a guidance profile
//! 3. `check_and_get_result()` to submit content and wait for the scorecard
//!
//! Every failure is an `AcrolinxError` with a stable `ErrorType`.

pub mod addons;
pub mod ai_service;
pub mod capabilities;
pub mod check;
pub mod dictionary;
pub mod document;
pub mod endpoint;
pub mod extraction;
pub mod notifications;
pub mod user;

#[cfg(test)]
mod mock_platform;

pub use acrolinx_auth as auth;
pub use acrolinx_http::{
    AcrolinxError, ApiResponse, Clock, EndpointConfig, ErrorType, ManualClock, PollOutcome,
    Progress, Result, ServiceType, TokioClock,
};
pub use addons::{AppAccessTokenResult, AppAccessTokenValidationResult, AppUser, HttpGetRequest};
pub use ai_service::{AiFeatures, ChatCompletionRequest, IsAiEnabledInformation, WriteResponse};
pub use capabilities::{
    CheckType, CheckingCapabilities, ContentEncoding, ContentFormat, GuidanceProfile,
    GuidanceProfileStatus, PlatformCapabilities, PlatformFeatures, PlatformInformation,
    ReportType,
};
pub use check::{
    AsyncOperationHandle, CheckAndGetResultOptions, CheckOptions, CheckRequest, CheckResult,
    CheckSession, CheckSubmission, Issue, LiveSearchRequest, LiveSearchResponse, Report,
};
pub use dictionary::{AddToDictionaryRequest, AddToDictionaryResponse, DictionaryScope};
pub use document::{DocumentDescriptor, DocumentDescriptorRequest};
pub use endpoint::{AcrolinxEndpoint, EndpointBuilder};
pub use extraction::{AnalysisRequest, AnalysisType, ExtractionResult};
pub use notifications::{ServerNotification, ServerNotificationPost};
pub use user::{CustomField, KeyValuePair, User};
pub use tokio_util::sync::CancellationToken;
