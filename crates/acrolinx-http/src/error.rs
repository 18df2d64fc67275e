//! Error model for every platform call
//!
//! All failures, whether a dropped connection, a malformed body, a
//! structured platform error or an identity-provider OAuth error, are
//! normalized into one `AcrolinxError` so callers only ever branch on
//! `error_type`.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Stable error kinds. Wire strings are preserved; unknown strings are kept
/// in `Other` so platform additions still round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorType {
    HttpErrorStatus,
    HttpConnectionProblem,
    InvalidJson,
    Client,
    Server,
    ClientSignatureMissing,
    ClientSignatureRejected,
    Auth,
    Sso,
    NotFound,
    SigninTimedOut,
    CheckCancelled,
    CheckFailed,
    CheckTimedOut,
    CustomFieldsIncorrect,
    Validation,
    InsufficientPrivileges,
    GuidanceProfileDoesNotExist,
    InvalidBaseUrl,
    NoGuidanceProfileConfigured,
    AppSignatureRejected,
    LicenseLimitExceeded,
    AuthorizationPending,
    SlowDown,
    AccessDenied,
    ExpiredToken,
    InvalidClient,
    RealmNotExist,
    InvalidGrant,
    UnsupportedGrantType,
    Other(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::HttpErrorStatus => "http_error_status",
            Self::HttpConnectionProblem => "http_connection_problem",
            Self::InvalidJson => "invalid_json",
            Self::Client => "client",
            Self::Server => "server",
            Self::ClientSignatureMissing => "clientSignatureMissing",
            Self::ClientSignatureRejected => "clientSignatureRejected",
            Self::Auth => "auth",
            Self::Sso => "sso",
            Self::NotFound => "not_found",
            Self::SigninTimedOut => "interactiveSignInTimedOut",
            Self::CheckCancelled => "checkCancelled",
            Self::CheckFailed => "checkFailed",
            Self::CheckTimedOut => "checkTimedOut",
            Self::CustomFieldsIncorrect => "customFieldsIncorrect",
            Self::Validation => "validation",
            Self::InsufficientPrivileges => "insufficientPrivileges",
            Self::GuidanceProfileDoesNotExist => "guidanceProfileDoesntExist",
            Self::InvalidBaseUrl => "invalidBaseUrl",
            Self::NoGuidanceProfileConfigured => "noGuidanceProfileConfigured",
            Self::AppSignatureRejected => "appSignatureRejected",
            Self::LicenseLimitExceeded => "licenseLimitExceeded",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::AccessDenied => "access_denied",
            Self::ExpiredToken => "expired_token",
            Self::InvalidClient => "invalid_client",
            Self::RealmNotExist => "Realm does not exist",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ErrorType {
    fn from(s: &str) -> Self {
        match s {
            "http_error_status" => Self::HttpErrorStatus,
            "http_connection_problem" => Self::HttpConnectionProblem,
            "invalid_json" => Self::InvalidJson,
            "client" => Self::Client,
            "server" => Self::Server,
            "clientSignatureMissing" => Self::ClientSignatureMissing,
            "clientSignatureRejected" => Self::ClientSignatureRejected,
            "auth" => Self::Auth,
            "sso" => Self::Sso,
            "not_found" => Self::NotFound,
            "interactiveSignInTimedOut" => Self::SigninTimedOut,
            "checkCancelled" => Self::CheckCancelled,
            "checkFailed" => Self::CheckFailed,
            "checkTimedOut" => Self::CheckTimedOut,
            "customFieldsIncorrect" => Self::CustomFieldsIncorrect,
            "validation" => Self::Validation,
            "insufficientPrivileges" => Self::InsufficientPrivileges,
            "guidanceProfileDoesntExist" => Self::GuidanceProfileDoesNotExist,
            "invalidBaseUrl" => Self::InvalidBaseUrl,
            "noGuidanceProfileConfigured" => Self::NoGuidanceProfileConfigured,
            "appSignatureRejected" => Self::AppSignatureRejected,
            "licenseLimitExceeded" => Self::LicenseLimitExceeded,
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" => Self::AccessDenied,
            "expired_token" => Self::ExpiredToken,
            "invalid_client" => Self::InvalidClient,
            "Realm does not exist" => Self::RealmNotExist,
            "invalid_grant" => Self::InvalidGrant,
            "unsupported_grant_type" => Self::UnsupportedGrantType,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl From<String> for ErrorType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<ErrorType> for String {
    fn from(t: ErrorType) -> Self {
        t.as_str().to_owned()
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rejected field of a `validation` error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationDetail {
    pub title: String,
    pub constraint: String,
    pub attribute_path: String,
    pub detail: String,
    pub invalid_value: Value,
    pub possible_values: Option<Vec<Value>>,
}

/// The request an error belongs to. Only URL and method are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
        }
    }
}

/// Unified error for all platform operations.
#[derive(Debug, thiserror::Error)]
#[error("{title}: {detail}")]
pub struct AcrolinxError {
    pub error_type: ErrorType,
    pub title: String,
    pub detail: String,
    pub status: Option<u16>,
    pub reference: Option<String>,
    pub validation_details: Vec<ValidationDetail>,
    /// Set when a check fails with `customFieldsIncorrect`
    pub document_id: Option<String>,
    pub http_request: Option<HttpRequest>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Result alias for platform operations.
pub type Result<T> = std::result::Result<T, AcrolinxError>;

/// Structured platform error body (`{type, title, detail, ...}`)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiErrorBody {
    #[serde(rename = "type")]
    error_type: Option<String>,
    title: Option<String>,
    detail: Option<String>,
    status: Option<u16>,
    reference: Option<String>,
    validation_details: Option<Vec<ValidationDetail>>,
    document_id: Option<String>,
}

impl AcrolinxError {
    pub fn new(error_type: ErrorType, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error_type,
            title: title.into(),
            detail: detail.into(),
            status: None,
            reference: None,
            validation_details: Vec::new(),
            document_id: None,
            http_request: None,
            cause: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request(mut self, request: HttpRequest) -> Self {
        self.http_request = Some(request);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The request never produced a response.
    pub fn connection_problem(
        request: HttpRequest,
        cause: impl std::error::Error + Send + Sync + 'static,
        kind: &str,
    ) -> Self {
        let detail = format!(
            "{cause} ({kind}, URL: {}, Method: {})",
            request.url, request.method
        );
        Self::new(
            ErrorType::HttpConnectionProblem,
            "Http Connection Problem",
            detail,
        )
        .with_request(request)
        .with_cause(cause)
    }

    pub fn invalid_json(request: Option<HttpRequest>, detail: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorType::InvalidJson, "Invalid Json", detail);
        err.http_request = request;
        err
    }

    /// Raised when a check is cancelled by the caller. Mirrors the error the
    /// platform returns when polling a cancelled check.
    pub fn check_cancelled() -> Self {
        Self::new(
            ErrorType::CheckCancelled,
            "Check canceled",
            "The check was canceled. No result is available.",
        )
        .with_status(400)
    }

    pub fn check_timed_out(elapsed: Duration, timeout: Duration) -> Self {
        Self::new(
            ErrorType::CheckTimedOut,
            "Check timed out",
            format!(
                "Waiting for the check result has timed out by client ({} > {} ms).",
                elapsed.as_millis(),
                timeout.as_millis()
            ),
        )
    }

    pub fn signin_timed_out(elapsed: Duration, timeout: Duration) -> Self {
        Self::new(
            ErrorType::SigninTimedOut,
            "Interactive sign-in time out",
            format!(
                "Interactive sign-in has timed out by client ({} > {} ms).",
                elapsed.as_millis(),
                timeout.as_millis()
            ),
        )
    }

    /// Build an error from a parsed response body.
    ///
    /// Resolution order: structured platform error (`type` present), then an
    /// OAuth error (`error` string) on identity-provider URLs, then a generic
    /// `http_error_status` carrying the status text and the raw body.
    pub(crate) fn from_response_body(
        request: &HttpRequest,
        status: StatusCode,
        body: &Value,
    ) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default();

        let has_type = body
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.is_empty());
        if has_type {
            let parsed: ApiErrorBody = serde_json::from_value(body.clone()).unwrap_or_default();
            let error_type = ErrorType::from(parsed.error_type.unwrap_or_default());
            let title = parsed
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| status_text.to_owned());
            let detail = parsed
                .detail
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| "Unknown HTTP Error".to_owned());
            let mut err = Self::new(error_type, title, detail)
                .with_status(parsed.status.unwrap_or(status.as_u16()))
                .with_request(request.clone());
            err.reference = parsed.reference;
            err.validation_details = parsed.validation_details.unwrap_or_default();
            err.document_id = parsed.document_id;
            return err;
        }

        if let Some(oauth_error) = body.get("error").and_then(Value::as_str)
            && is_identity_provider_url(&request.url)
        {
            let detail = body
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Self::new(ErrorType::from(oauth_error), oauth_error, detail)
                .with_status(status.as_u16())
                .with_request(request.clone());
        }

        Self::unknown_status(request, status, &body.to_string())
    }

    /// Error for a non-2xx response whose body is not JSON.
    pub(crate) fn unknown_status(request: &HttpRequest, status: StatusCode, body: &str) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default();
        Self::new(
            ErrorType::HttpErrorStatus,
            "Unknown HTTP Error",
            format!("{status_text}:{body}"),
        )
        .with_status(status.as_u16())
        .with_request(request.clone())
    }
}

/// True for `.../realms/<realm>/protocol/openid-connect...` URLs.
pub fn is_identity_provider_url(url: &str) -> bool {
    let Some(start) = url.find("realms/") else {
        return false;
    };
    let rest = &url[start + "realms/".len()..];
    rest.find("/protocol/openid-connect").is_some_and(|i| i > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(url: &str) -> HttpRequest {
        HttpRequest::new("GET", url)
    }

    #[test]
    fn structured_error_preserves_fields() {
        let body = json!({
            "type": "auth",
            "title": "Authentication failed",
            "detail": "The access token is invalid",
            "status": 401,
            "reference": "ref-42",
            "validationDetails": [{"title": "t", "constraint": "c", "attributePath": "a", "detail": "d", "invalidValue": 3}]
        });
        let err = AcrolinxError::from_response_body(
            &request("http://dummy-server/api/v1/capabilities"),
            StatusCode::UNAUTHORIZED,
            &body,
        );
        assert_eq!(err.error_type, ErrorType::Auth);
        assert_eq!(err.title, "Authentication failed");
        assert_eq!(err.detail, "The access token is invalid");
        assert_eq!(err.status, Some(401));
        assert_eq!(err.reference.as_deref(), Some("ref-42"));
        assert_eq!(err.validation_details[0].attribute_path, "a");
        assert_eq!(
            err.http_request.unwrap().url,
            "http://dummy-server/api/v1/capabilities"
        );
    }

    #[test]
    fn structured_error_falls_back_to_response_status_and_text() {
        let body = json!({"type": "client"});
        let err = AcrolinxError::from_response_body(
            &request("http://dummy-server/poll"),
            StatusCode::NOT_FOUND,
            &body,
        );
        assert_eq!(err.error_type, ErrorType::Client);
        assert_eq!(err.title, "Not Found");
        assert_eq!(err.detail, "Unknown HTTP Error");
        assert_eq!(err.status, Some(404));
    }

    #[test]
    fn oauth_error_on_identity_provider_url() {
        let body = json!({"error": "invalid_grant", "error_description": "Token is not active"});
        let err = AcrolinxError::from_response_body(
            &request("https://auth.acrolinx.cloud/realms/tenant/protocol/openid-connect/token"),
            StatusCode::BAD_REQUEST,
            &body,
        );
        assert_eq!(err.error_type, ErrorType::InvalidGrant);
        assert_eq!(err.title, "invalid_grant");
        assert_eq!(err.detail, "Token is not active");
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn oauth_error_elsewhere_is_unknown_http_error() {
        let body = json!({"error": "invalid_grant"});
        let err = AcrolinxError::from_response_body(
            &request("http://dummy-server/api/v1/user/1"),
            StatusCode::BAD_REQUEST,
            &body,
        );
        assert_eq!(err.error_type, ErrorType::HttpErrorStatus);
        assert_eq!(err.title, "Unknown HTTP Error");
        assert_eq!(err.detail, r#"Bad Request:{"error":"invalid_grant"}"#);
    }

    #[test]
    fn identity_provider_url_detection() {
        assert!(is_identity_provider_url(
            "https://a.b/realms/x/protocol/openid-connect/auth/device"
        ));
        assert!(!is_identity_provider_url(
            "https://a.b/realms//protocol/openid-connect/token"
        ));
        assert!(!is_identity_provider_url("https://a.b/api/v1/auth/sign-ins"));
    }

    #[test]
    fn error_type_wire_strings_round_trip() {
        for wire in [
            "interactiveSignInTimedOut",
            "checkCancelled",
            "Realm does not exist",
            "guidanceProfileDoesntExist",
            "slow_down",
        ] {
            assert_eq!(ErrorType::from(wire).as_str(), wire);
        }
        assert_eq!(
            ErrorType::from("brandNewType"),
            ErrorType::Other("brandNewType".into())
        );
        let json = serde_json::to_string(&ErrorType::SigninTimedOut).unwrap();
        assert_eq!(json, r#""interactiveSignInTimedOut""#);
    }

    #[test]
    fn check_cancelled_matches_platform_error() {
        let err = AcrolinxError::check_cancelled();
        assert_eq!(err.error_type, ErrorType::CheckCancelled);
        assert_eq!(err.title, "Check canceled");
        assert_eq!(err.status, Some(400));
        assert_eq!(
            err.to_string(),
            "Check canceled: The check was canceled. No result is available."
        );
    }

    #[test]
    fn connection_problem_keeps_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AcrolinxError::connection_problem(
            HttpRequest::new("POST", "http://dummy-server/api/v1/checking/checks"),
            cause,
            "connect",
        );
        assert_eq!(err.error_type, ErrorType::HttpConnectionProblem);
        assert_eq!(
            err.detail,
            "refused (connect, URL: http://dummy-server/api/v1/checking/checks, Method: POST)"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
