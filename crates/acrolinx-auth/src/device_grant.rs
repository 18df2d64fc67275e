//! OAuth 2.0 device authorization grant (RFC 8628)
//!
//! Used by integrations without a browser of their own. The tenant's
//! identity provider is discovered through the platform, then:
//!
//! ```text
//! Idle -> AwaitingUserAction -> Polling -> Granted | Expired | Denied
//! ```
//!
//! A cached refresh token is always tried first; the user is only involved
//! when that silent exchange fails.

use crate::constants::{
    DEFAULT_DEVICE_CLIENT_ID, DEVICE_CODE_GRANT_TYPE, DEVICE_GRANT_SCOPE, LOGIN_INFO_PATH,
    SLOW_DOWN_INCREMENT,
};
use acrolinx_http::poll::retry_after_from_secs;
use acrolinx_http::{
    AcrolinxError, Clock, ErrorType, HttpRequest, HttpTransport, RequestOptions, Result,
};
use common::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// RFC 8628 section 3.2: default polling interval when the server omits one.
const DEFAULT_POLLING_INTERVAL_SECS: f64 = 5.0;

/// Where a device sign-in currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceGrantState {
    Idle,
    AwaitingUserAction,
    Polling,
    Granted,
    Expired,
    Denied,
}

impl DeviceGrantState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingUserAction => "awaiting_user_action",
            Self::Polling => "polling",
            Self::Granted => "granted",
            Self::Expired => "expired",
            Self::Denied => "denied",
        }
    }
}

/// Identity provider endpoints of one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceGrantEndpoints {
    pub device_authorization: String,
    pub token: String,
}

impl DeviceGrantEndpoints {
    pub fn from_login_url(login_url: &str, tenant_id: &str) -> Self {
        let base = format!(
            "{}/realms/{}/protocol/openid-connect",
            login_url.trim_end_matches('/'),
            urlencoding::encode(tenant_id)
        );
        Self {
            device_authorization: format!("{base}/auth/device"),
            token: format!("{base}/token"),
        }
    }
}

/// A started device authorization. Show `user_code` and `verification_url`
/// to the user, then poll.
#[derive(Clone)]
pub struct DeviceGrantSession {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub verification_url_complete: Option<String>,
    pub expires_in: Duration,
    pub polling_interval: Duration,
    pub endpoints: DeviceGrantEndpoints,
    pub client_id: String,
}

impl fmt::Debug for DeviceGrantSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceGrantSession")
            .field("device_code", &"[REDACTED]")
            .field("user_code", &self.user_code)
            .field("verification_url", &self.verification_url)
            .field("verification_url_complete", &self.verification_url_complete)
            .field("expires_in", &self.expires_in)
            .field("polling_interval", &self.polling_interval)
            .field("endpoints", &self.endpoints)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DeviceAuthorizationResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    expires_in: f64,
    #[serde(default)]
    interval: Option<f64>,
}

/// Tokens issued by the identity provider.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGrantToken {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(rename = "not-before-policy", default)]
    pub not_before_policy: Option<i64>,
    #[serde(default)]
    pub session_state: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl DeviceGrantToken {
    /// Granted means both an access and a refresh token were issued.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for DeviceGrantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceGrantToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceSignInOptions {
    pub tenant_id: String,
    /// Defaults to `DEFAULT_DEVICE_CLIENT_ID`.
    pub client_id: Option<String>,
    /// Refresh token from an earlier grant; tried before involving the user.
    pub refresh_token: Option<Secret<String>>,
    /// Upper bound on polling. The grant's own `expires_in` applies when shorter.
    pub timeout: Option<Duration>,
}

impl DeviceSignInOptions {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    fn client_id(&self) -> &str {
        self.client_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_DEVICE_CLIENT_ID)
    }
}

#[derive(Debug, Clone)]
pub enum DeviceSignInResult {
    /// The cached refresh token was still good.
    Refreshed(DeviceGrantToken),
    /// The user must visit the verification URL; poll the session afterwards.
    PendingUserAction(DeviceGrantSession),
}

impl DeviceSignInResult {
    pub fn state(&self) -> DeviceGrantState {
        match self {
            Self::Refreshed(_) => DeviceGrantState::Granted,
            Self::PendingUserAction(_) => DeviceGrantState::AwaitingUserAction,
        }
    }
}

/// Ask the platform where the tenant's identity provider lives.
pub async fn fetch_login_info(transport: &HttpTransport, tenant_id: &str) -> Result<String> {
    let path = LOGIN_INFO_PATH.replace("{tenant}", &urlencoding::encode(tenant_id));
    let request = HttpRequest::new("GET", transport.url_of_path(&path));
    let body: Value = transport
        .get_json_from_path(&path, None, &RequestOptions::default())
        .await?;

    body.pointer("/data/loginUrl")
        .or_else(|| body.get("loginUrl"))
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| AcrolinxError::invalid_json(Some(request), "login info without loginUrl"))
}

/// Discover the identity provider and start a device authorization.
pub async fn start_device_auth(
    transport: &HttpTransport,
    tenant_id: &str,
    client_id: Option<&str>,
) -> Result<DeviceGrantSession> {
    let login_url = fetch_login_info(transport, tenant_id).await?;
    let endpoints = DeviceGrantEndpoints::from_login_url(&login_url, tenant_id);
    let client_id = client_id
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_DEVICE_CLIENT_ID);
    request_device_code(transport, endpoints, client_id).await
}

async fn request_device_code(
    transport: &HttpTransport,
    endpoints: DeviceGrantEndpoints,
    client_id: &str,
) -> Result<DeviceGrantSession> {
    let response: DeviceAuthorizationResponse = transport
        .post_form(
            &endpoints.device_authorization,
            &[("client_id", client_id), ("scope", DEVICE_GRANT_SCOPE)],
        )
        .await?;

    let session = DeviceGrantSession {
        device_code: response.device_code,
        user_code: response.user_code,
        verification_url: response.verification_uri,
        verification_url_complete: response.verification_uri_complete,
        expires_in: retry_after_from_secs(response.expires_in),
        polling_interval: retry_after_from_secs(
            response.interval.unwrap_or(DEFAULT_POLLING_INTERVAL_SECS),
        ),
        endpoints,
        client_id: client_id.to_owned(),
    };
    info!(
        state = DeviceGrantState::AwaitingUserAction.label(),
        expires_in_secs = session.expires_in.as_secs(),
        "device authorization started"
    );
    Ok(session)
}

/// Exchange a refresh token for fresh tokens without user interaction.
pub async fn refresh_device_token(
    transport: &HttpTransport,
    endpoints: &DeviceGrantEndpoints,
    client_id: &str,
    refresh_token: &Secret<String>,
) -> Result<DeviceGrantToken> {
    let token: DeviceGrantToken = transport
        .post_form(
            &endpoints.token,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("refresh_token", refresh_token.expose().as_str()),
            ],
        )
        .await?;
    complete_token(&endpoints.token, token)
}

fn complete_token(token_url: &str, token: DeviceGrantToken) -> Result<DeviceGrantToken> {
    if token.is_complete() {
        Ok(token)
    } else {
        Err(AcrolinxError::invalid_json(
            Some(HttpRequest::new("POST", token_url)),
            "token response without access or refresh token",
        ))
    }
}

/// Poll the token endpoint until the user approves, denies, or time runs out.
///
/// Waits `polling_interval` before every attempt. The effective deadline is
/// the shorter of the grant's `expires_in` and `timeout`.
pub async fn poll_for_device_token(
    transport: &HttpTransport,
    clock: &dyn Clock,
    session: &DeviceGrantSession,
    timeout: Option<Duration>,
) -> Result<DeviceGrantToken> {
    let deadline = timeout.map_or(session.expires_in, |t| t.min(session.expires_in));
    let started = clock.now();
    let mut interval = session.polling_interval;
    let timed_out = |clock: &dyn Clock| {
        let elapsed = clock.now().saturating_duration_since(started);
        (elapsed >= deadline).then(|| {
            info!(
                state = DeviceGrantState::Expired.label(),
                "device authorization timed out"
            );
            AcrolinxError::signin_timed_out(elapsed, deadline)
        })
    };

    debug!(state = DeviceGrantState::Polling.label(), "polling for device token");
    loop {
        if let Some(err) = timed_out(clock) {
            return Err(err);
        }
        let remaining = deadline.saturating_sub(clock.now().saturating_duration_since(started));
        clock.sleep(interval.min(remaining)).await;
        if let Some(err) = timed_out(clock) {
            return Err(err);
        }

        let attempt = transport
            .post_form::<DeviceGrantToken>(
                &session.endpoints.token,
                &[
                    ("grant_type", DEVICE_CODE_GRANT_TYPE),
                    ("client_id", session.client_id.as_str()),
                    ("device_code", session.device_code.as_str()),
                ],
            )
            .await;

        match attempt {
            Ok(token) => {
                let token = complete_token(&session.endpoints.token, token)?;
                info!(state = DeviceGrantState::Granted.label(), "device authorization granted");
                return Ok(token);
            }
            Err(e) => match e.error_type {
                ErrorType::AuthorizationPending => {
                    debug!("authorization pending");
                }
                ErrorType::SlowDown => {
                    interval += SLOW_DOWN_INCREMENT;
                    debug!(
                        interval_secs = interval.as_secs_f64(),
                        "identity provider asked to slow down"
                    );
                }
                ErrorType::AccessDenied => {
                    info!(state = DeviceGrantState::Denied.label(), "device authorization denied");
                    return Err(e);
                }
                ErrorType::ExpiredToken => {
                    info!(state = DeviceGrantState::Expired.label(), "device code expired");
                    return Err(e);
                }
                _ => return Err(e),
            },
        }
    }
}

/// Refresh silently when possible, otherwise start a device authorization.
pub async fn device_auth_sign_in(
    transport: &HttpTransport,
    options: &DeviceSignInOptions,
) -> Result<DeviceSignInResult> {
    let login_url = fetch_login_info(transport, &options.tenant_id).await?;
    let endpoints = DeviceGrantEndpoints::from_login_url(&login_url, &options.tenant_id);
    let client_id = options.client_id();

    if let Some(refresh_token) = options.refresh_token.as_ref().filter(|t| !t.is_blank()) {
        match refresh_device_token(transport, &endpoints, client_id, refresh_token).await {
            Ok(token) => {
                info!(state = DeviceGrantState::Granted.label(), "refreshed device token");
                return Ok(DeviceSignInResult::Refreshed(token));
            }
            Err(e) if matches!(e.error_type, ErrorType::InvalidGrant | ErrorType::ExpiredToken) => {
                warn!(
                    error_type = %e.error_type,
                    "refresh token rejected, starting device authorization"
                );
            }
            Err(e) => return Err(e),
        }
    }

    let session = request_device_code(transport, endpoints, client_id).await?;
    Ok(DeviceSignInResult::PendingUserAction(session))
}

/// Complete a device sign-in end to end.
///
/// `on_user_action` fires once with the session, before the first poll, and
/// not at all when the refresh token was accepted.
pub async fn device_auth_sign_in_interactive(
    transport: &HttpTransport,
    clock: &dyn Clock,
    options: &DeviceSignInOptions,
    on_user_action: impl FnOnce(&DeviceGrantSession),
) -> Result<DeviceGrantToken> {
    match device_auth_sign_in(transport, options).await? {
        DeviceSignInResult::Refreshed(token) => Ok(token),
        DeviceSignInResult::PendingUserAction(session) => {
            on_user_action(&session);
            poll_for_device_token(transport, clock, &session, options.timeout).await
        }
    }
}
