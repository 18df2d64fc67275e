//! Platform sign-in: token, SSO and interactive browser flows
//!
//! `sign_in` is a single round trip that either succeeds immediately (valid
//! token or SSO credentials) or returns links for an interactive sign-in.
//! The interactive path is completed by polling the returned poll link,
//! honoring the server's `retryAfter` between polls.

use crate::constants::{DEFAULT_INTERACTIVE_SIGN_IN_TIMEOUT, SIGN_IN_PATH};
use acrolinx_http::headers::HEADER_X_ACROLINX_AUTH;
use acrolinx_http::poll::classify_poll_response;
use acrolinx_http::{
    AcrolinxError, Clock, ErrorType, HttpRequest, HttpTransport, PollOutcome, Progress,
    RequestOptions, Result,
};
use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// How to authenticate the sign-in request.
#[derive(Debug, Clone, Default)]
pub enum SignInOptions {
    /// No credentials; the platform answers with interactive sign-in links.
    #[default]
    Anonymous,
    /// Previously issued access token, sent as `X-Acrolinx-Auth`.
    Token(Secret<String>),
    /// Single sign-on with a generic token, sent as `username` / `password`.
    Sso {
        username: String,
        generic_token: Secret<String>,
    },
}

impl SignInOptions {
    /// Headers for the sign-in request. Blank credentials fall back to anonymous.
    fn request_headers(&self) -> Vec<(String, String)> {
        match self {
            Self::Token(token) if !token.is_blank() => {
                vec![(HEADER_X_ACROLINX_AUTH.to_owned(), token.expose().clone())]
            }
            Self::Sso {
                username,
                generic_token,
            } if !username.is_empty() && !generic_token.is_blank() => vec![
                ("username".to_owned(), encode_unless_encoded(username)),
                (
                    "password".to_owned(),
                    encode_unless_encoded(generic_token.expose()),
                ),
            ],
            _ => Vec::new(),
        }
    }
}

/// Percent-encode a header credential unless the caller already did.
fn encode_unless_encoded(value: &str) -> String {
    if is_url_encoded(value) {
        value.to_owned()
    } else {
        urlencoding::encode(value).into_owned()
    }
}

fn is_url_encoded(value: &str) -> bool {
    if !value.contains('%') {
        return false;
    }
    urlencoding::decode(value).is_ok_and(|decoded| decoded != value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationType {
    AcrolinxSso,
    AcrolinxSignIn,
    AcrolinxToken,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonLinks {
    pub icon: String,
    pub app: String,
}

/// App that the integration may show next to check results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Addon {
    pub id: String,
    pub title: String,
    pub links: AddonLinks,
}

/// Settings the platform pushes to the integration on sign-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationInfo {
    pub properties: HashMap<String, String>,
    pub addons: Vec<Addon>,
}

/// A completed sign-in.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInSuccess {
    pub access_token: String,
    pub user: SignInUser,
    #[serde(default)]
    pub integration: IntegrationInfo,
    pub authorized_using: AuthorizationType,
}

impl fmt::Debug for SignInSuccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInSuccess")
            .field("access_token", &"[REDACTED]")
            .field("user", &self.user)
            .field("integration", &self.integration)
            .field("authorized_using", &self.authorized_using)
            .finish()
    }
}

/// Links for an interactive sign-in that the user completes in a browser.
#[derive(Debug, Clone, PartialEq)]
pub struct SignInLinks {
    /// URL to open for the user
    pub interactive: String,
    pub poll: String,
    /// How long the interactive URL stays valid
    pub interactive_link_timeout: Option<Duration>,
}

/// Outcome of `sign_in`.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInResult {
    Links(SignInLinks),
    Success(SignInSuccess),
}

impl SignInResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_links(&self) -> bool {
        matches!(self, Self::Links(_))
    }

    /// Classify a sign-in response body.
    ///
    /// A response is `Links` iff it carries a non-empty `links.interactive`;
    /// otherwise it must carry a non-empty `data.accessToken`.
    pub fn from_body(request: &HttpRequest, body: Value) -> Result<Self> {
        let interactive = non_empty_str(&body, "/links/interactive");
        if let Some(interactive) = interactive {
            let poll = non_empty_str(&body, "/links/poll").ok_or_else(|| {
                AcrolinxError::invalid_json(
                    Some(request.clone()),
                    "sign-in links without a poll link",
                )
            })?;
            let interactive_link_timeout = body
                .pointer("/data/interactiveLinkTimeout")
                .and_then(Value::as_f64)
                .map(acrolinx_http::poll::retry_after_from_secs);
            return Ok(Self::Links(SignInLinks {
                interactive: interactive.to_owned(),
                poll: poll.to_owned(),
                interactive_link_timeout,
            }));
        }

        if non_empty_str(&body, "/data/accessToken").is_none() {
            return Err(AcrolinxError::invalid_json(
                Some(request.clone()),
                "sign-in response has neither interactive links nor an access token",
            ));
        }
        let data = body.get("data").cloned().unwrap_or_default();
        let success: SignInSuccess = serde_json::from_value(data).map_err(|e| {
            AcrolinxError::invalid_json(Some(request.clone()), format!("invalid sign-in data: {e}"))
        })?;
        Ok(Self::Success(success))
    }
}

fn non_empty_str<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Options for `sign_in_interactive`.
#[derive(Debug, Clone, Default)]
pub struct InteractiveSignInOptions {
    /// Stored token to try first; interactive sign-in starts only if it is rejected.
    pub access_token: Option<Secret<String>>,
    /// Defaults to `DEFAULT_INTERACTIVE_SIGN_IN_TIMEOUT`.
    pub timeout: Option<Duration>,
}

/// Start a sign-in. One round trip, no polling.
pub async fn sign_in(transport: &HttpTransport, options: &SignInOptions) -> Result<SignInResult> {
    let request = HttpRequest::new("POST", transport.url_of_path(SIGN_IN_PATH));
    let opts = RequestOptions {
        headers: options.request_headers(),
        service_type: None,
    };
    let body: Value = transport
        .post_json_to_path(SIGN_IN_PATH, &json!({}), None, &opts)
        .await?;
    let result = SignInResult::from_body(&request, body)?;
    debug!(links = result.is_links(), "sign-in response received");
    Ok(result)
}

/// Poll an interactive sign-in once.
///
/// When `last_progress` carries a retry delay, waits that long first and then
/// polls its fresh poll link; otherwise polls the session's link immediately.
pub async fn poll_for_sign_in(
    transport: &HttpTransport,
    clock: &dyn Clock,
    links: &SignInLinks,
    last_progress: Option<&Progress>,
) -> Result<PollOutcome<SignInSuccess>> {
    let poll_link = match last_progress {
        Some(progress) => {
            if !progress.retry_after.is_zero() {
                debug!(
                    retry_after_secs = progress.retry_after.as_secs_f64(),
                    "waiting before sign-in poll"
                );
                clock.sleep(progress.retry_after).await;
            }
            progress.poll_link.as_str()
        }
        None => links.poll.as_str(),
    };

    let request = HttpRequest::new("GET", poll_link);
    let body: Value = transport
        .get_json(poll_link, None, &RequestOptions::default())
        .await?;
    let outcome = classify_poll_response::<SignInSuccess>(&request, body, poll_link)?;
    if let PollOutcome::Success(ref success) = outcome
        && success.access_token.is_empty()
    {
        return Err(AcrolinxError::invalid_json(
            Some(request),
            "sign-in poll returned data without an access token",
        ));
    }
    Ok(outcome)
}

/// Sign in, asking the user to open a URL if no valid token is available.
///
/// `on_sign_in_url` is called once with the interactive URL before polling
/// starts. Fails with `SigninTimedOut` when the user does not finish within
/// the timeout.
pub async fn sign_in_interactive(
    transport: &HttpTransport,
    clock: &dyn Clock,
    options: &InteractiveSignInOptions,
    on_sign_in_url: impl FnOnce(&str),
) -> Result<SignInSuccess> {
    let sign_in_options = match &options.access_token {
        Some(token) => SignInOptions::Token(token.clone()),
        None => SignInOptions::Anonymous,
    };

    let links = match sign_in(transport, &sign_in_options).await? {
        SignInResult::Success(success) => return Ok(success),
        SignInResult::Links(links) => links,
    };

    info!("interactive sign-in required");
    on_sign_in_url(&links.interactive);

    let timeout = options.timeout.unwrap_or(DEFAULT_INTERACTIVE_SIGN_IN_TIMEOUT);
    let started = clock.now();
    let mut last_progress: Option<Progress> = None;
    loop {
        let elapsed = clock.now().saturating_duration_since(started);
        if elapsed >= timeout {
            return Err(AcrolinxError::signin_timed_out(elapsed, timeout));
        }
        let remaining = timeout - elapsed;
        if last_progress
            .as_ref()
            .is_some_and(|progress| progress.retry_after >= remaining)
        {
            // The next poll would land past the deadline.
            clock.sleep(remaining).await;
            continue;
        }

        match poll_for_sign_in(transport, clock, &links, last_progress.as_ref()).await? {
            PollOutcome::Success(success) => {
                info!(user_id = %success.user.id, "interactive sign-in completed");
                return Ok(success);
            }
            PollOutcome::Progress(progress) => last_progress = Some(progress),
        }
    }
}

/// Sign in with SSO credentials. Anything but an immediate success is an `sso` error.
pub async fn sign_in_with_sso(
    transport: &HttpTransport,
    generic_token: Secret<String>,
    username: impl Into<String>,
) -> Result<SignInSuccess> {
    let options = SignInOptions::Sso {
        username: username.into(),
        generic_token,
    };
    match sign_in(transport, &options).await? {
        SignInResult::Success(success) => Ok(success),
        SignInResult::Links(_) => Err(AcrolinxError::new(
            ErrorType::Sso,
            "SSO Error",
            "Sign-In by SSO failed.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEVELOPMENT_SIGNATURE;
    use acrolinx_http::ManualClock;
    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use common::EndpointConfig;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    const DUMMY_ACCESS_TOKEN: &str = "dummyAccessToken";
    const DUMMY_USER_ID: &str = "dummyUserId";
    const DUMMY_USER_NAME: &str = "dummy@username.org";

    struct MockPlatform {
        base: String,
        polls: AtomicUsize,
        pending_forever: bool,
        sso_accepted: bool,
    }

    fn success_body(authorized_using: &str) -> Value {
        json!({
            "data": {
                "accessToken": DUMMY_ACCESS_TOKEN,
                "user": {"id": DUMMY_USER_ID, "username": DUMMY_USER_NAME},
                "integration": {"properties": {"telemetry": "off"}, "addons": []},
                "authorizedUsing": authorized_using,
                "links": {}
            },
            "links": {}
        })
    }

    async fn sign_in_handler(
        State(mock): State<Arc<MockPlatform>>,
        headers: HeaderMap,
    ) -> axum::Json<Value> {
        if headers
            .get("x-acrolinx-auth")
            .is_some_and(|v| v == DUMMY_ACCESS_TOKEN)
        {
            return axum::Json(success_body("ACROLINX_TOKEN"));
        }
        let sso = headers.get("username").is_some_and(|v| v == "user%40example.com")
            && headers.get("password").is_some_and(|v| v == "generic%2Ftoken");
        if mock.sso_accepted && sso {
            return axum::Json(success_body("ACROLINX_SSO"));
        }
        axum::Json(json!({
            "data": {"interactiveLinkTimeout": 900},
            "links": {
                "interactive": format!("{}/signin-ui/session-1", mock.base),
                "poll": format!("{}/api/v1/auth/sign-ins/session-1", mock.base)
            }
        }))
    }

    async fn poll_handler(
        State(mock): State<Arc<MockPlatform>>,
        Path(id): Path<String>,
    ) -> (StatusCode, axum::Json<Value>) {
        if id == "expired" {
            return (
                StatusCode::NOT_FOUND,
                axum::Json(json!({
                    "type": "client",
                    "title": "Sign-in URL expired",
                    "detail": "The sign-in URL is expired or was never valid.",
                    "status": 404
                })),
            );
        }
        let n = mock.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if mock.pending_forever || n < 2 {
            return (
                StatusCode::OK,
                axum::Json(json!({
                    "progress": {"percent": 0, "message": "Waiting for sign-in", "retryAfter": 1},
                    "links": {"poll": format!("{}/api/v1/auth/sign-ins/{id}", mock.base)}
                })),
            );
        }
        (StatusCode::OK, axum::Json(success_body("ACROLINX_SIGN_IN")))
    }

    async fn start_platform(pending_forever: bool, sso_accepted: bool) -> (Arc<MockPlatform>, HttpTransport) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let mock = Arc::new(MockPlatform {
            base: base.clone(),
            polls: AtomicUsize::new(0),
            pending_forever,
            sso_accepted,
        });
        let app = Router::new()
            .route("/api/v1/auth/sign-ins", post(sign_in_handler))
            .route("/api/v1/auth/sign-ins/{id}", get(poll_handler))
            .with_state(mock.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = EndpointConfig::new(&base, DEVELOPMENT_SIGNATURE, "1.2.3.666");
        (mock, HttpTransport::new(config).unwrap())
    }

    #[tokio::test]
    async fn token_sign_in_succeeds_without_polling() {
        let (mock, transport) = start_platform(false, false).await;

        let result = sign_in(&transport, &SignInOptions::Token(DUMMY_ACCESS_TOKEN.into()))
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(!result.is_links());
        let SignInResult::Success(success) = result else {
            unreachable!()
        };
        assert_eq!(success.user.id, DUMMY_USER_ID);
        assert_eq!(success.user.username, DUMMY_USER_NAME);
        assert_eq!(success.authorized_using, AuthorizationType::AcrolinxToken);
        assert_eq!(success.integration.properties["telemetry"], "off");
        assert_eq!(mock.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn anonymous_sign_in_returns_links() {
        let (mock, transport) = start_platform(false, false).await;

        let result = sign_in(&transport, &SignInOptions::Anonymous).await.unwrap();

        assert!(result.is_links());
        assert!(!result.is_success());
        let SignInResult::Links(links) = result else {
            unreachable!()
        };
        assert_eq!(links.interactive, format!("{}/signin-ui/session-1", mock.base));
        assert_eq!(links.interactive_link_timeout, Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn blank_token_is_anonymous() {
        let (_mock, transport) = start_platform(false, false).await;
        let result = sign_in(&transport, &SignInOptions::Token("".into())).await.unwrap();
        assert!(result.is_links());
    }

    #[tokio::test]
    async fn poll_waits_retry_after_only_after_progress() {
        let (mock, transport) = start_platform(false, false).await;
        let clock = ManualClock::new();
        let SignInResult::Links(links) = sign_in(&transport, &SignInOptions::Anonymous).await.unwrap() else {
            panic!("expected links");
        };

        let first = poll_for_sign_in(&transport, &clock, &links, None).await.unwrap();
        assert!(clock.sleeps().is_empty(), "first poll must not wait");
        let PollOutcome::Progress(progress) = first else {
            panic!("expected progress");
        };
        assert_eq!(progress.retry_after, Duration::from_secs(1));

        let second = poll_for_sign_in(&transport, &clock, &links, Some(&progress))
            .await
            .unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
        assert!(second.is_success());
        assert_eq!(mock.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interactive_sign_in_reports_url_once_and_polls_to_success() {
        let (mock, transport) = start_platform(false, false).await;
        let clock = ManualClock::new();
        let mut urls = Vec::new();

        let success = sign_in_interactive(
            &transport,
            &clock,
            &InteractiveSignInOptions::default(),
            |url| urls.push(url.to_owned()),
        )
        .await
        .unwrap();

        assert_eq!(urls, vec![format!("{}/signin-ui/session-1", mock.base)]);
        assert_eq!(success.authorized_using, AuthorizationType::AcrolinxSignIn);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn interactive_sign_in_skips_polling_for_valid_token() {
        let (mock, transport) = start_platform(false, false).await;
        let clock = ManualClock::new();
        let options = InteractiveSignInOptions {
            access_token: Some(DUMMY_ACCESS_TOKEN.into()),
            timeout: None,
        };
        let mut called = false;

        let success = sign_in_interactive(&transport, &clock, &options, |_| called = true)
            .await
            .unwrap();

        assert!(!called);
        assert_eq!(success.access_token, DUMMY_ACCESS_TOKEN);
        assert_eq!(mock.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interactive_sign_in_times_out() {
        let (_mock, transport) = start_platform(true, false).await;
        let clock = ManualClock::new();
        let options = InteractiveSignInOptions {
            access_token: None,
            timeout: Some(Duration::from_secs(3)),
        };

        let err = sign_in_interactive(&transport, &clock, &options, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.error_type, ErrorType::SigninTimedOut);
        assert_eq!(err.title, "Interactive sign-in time out");
        assert!(clock.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn interactive_timeout_shorter_than_retry_after_is_not_overslept() {
        let (mock, transport) = start_platform(true, false).await;
        let clock = ManualClock::new();
        let timeout = Duration::from_millis(300);
        let options = InteractiveSignInOptions {
            access_token: None,
            timeout: Some(timeout),
        };

        let err = sign_in_interactive(&transport, &clock, &options, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.error_type, ErrorType::SigninTimedOut);
        assert_eq!(clock.sleeps(), vec![timeout]);
        assert_eq!(clock.elapsed(), timeout);
        assert_eq!(mock.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_poll_link_is_client_error() {
        let (mock, transport) = start_platform(false, false).await;
        let clock = ManualClock::new();
        let links = SignInLinks {
            interactive: format!("{}/signin-ui/expired", mock.base),
            poll: format!("{}/api/v1/auth/sign-ins/expired", mock.base),
            interactive_link_timeout: None,
        };

        let err = poll_for_sign_in(&transport, &clock, &links, None)
            .await
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Client);
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn sso_sign_in_encodes_credentials() {
        let (_mock, transport) = start_platform(false, true).await;
        let success = sign_in_with_sso(&transport, "generic/token".into(), "user@example.com")
            .await
            .unwrap();
        assert_eq!(success.authorized_using, AuthorizationType::AcrolinxSso);
    }

    #[tokio::test]
    async fn sso_sign_in_without_success_is_sso_error() {
        let (_mock, transport) = start_platform(false, false).await;
        let err = sign_in_with_sso(&transport, "generic/token".into(), "user@example.com")
            .await
            .unwrap_err();
        assert_eq!(err.error_type, ErrorType::Sso);
        assert_eq!(err.title, "SSO Error");
        assert_eq!(err.detail, "Sign-In by SSO failed.");
    }

    #[test]
    fn already_encoded_credentials_are_kept() {
        assert_eq!(encode_unless_encoded("user%40example.com"), "user%40example.com");
        assert_eq!(encode_unless_encoded("a b"), "a%20b");
        assert_eq!(encode_unless_encoded("100%"), "100%25");
    }

    #[test]
    fn response_with_neither_shape_is_invalid_json() {
        let err = SignInResult::from_body(
            &HttpRequest::new("POST", "http://dummy-server/api/v1/auth/sign-ins"),
            json!({"data": {}, "links": {}}),
        )
        .unwrap_err();
        assert_eq!(err.error_type, ErrorType::InvalidJson);
    }

    #[test]
    fn debug_redacts_access_token() {
        let SignInResult::Success(success) = SignInResult::from_body(
            &HttpRequest::new("POST", "http://dummy-server/api/v1/auth/sign-ins"),
            success_body("ACROLINX_TOKEN"),
        )
        .unwrap() else {
            panic!("expected success");
        };
        assert!(!format!("{success:?}").contains(DUMMY_ACCESS_TOKEN));
    }
}
