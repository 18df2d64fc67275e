//! Add-on apps and their access tokens

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use acrolinx_auth::{Addon, AddonLinks};

pub(crate) const VALIDATE_APP_ACCESS_TOKEN_PATH: &str = "/api/v1/apps/whoami";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUser {
    pub id: String,
    pub username: String,
}

#[derive(Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AppAccessTokenApiResult {
    pub(crate) app_access_token: String,
    pub(crate) user: AppUser,
    pub(crate) app_id: String,
}

/// Request an add-on app sends to prove its token is valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpGetRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

/// Token for an add-on app, plus the request the app uses to validate it.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppAccessTokenResult {
    pub app_access_token: String,
    pub user: AppUser,
    pub app_id: String,
    pub validation_request: HttpGetRequest,
}

impl std::fmt::Debug for AppAccessTokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppAccessTokenResult")
            .field("app_access_token", &"[REDACTED]")
            .field("user", &self.user)
            .field("app_id", &self.app_id)
            .field("validation_request.url", &self.validation_request.url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAccessTokenValidationResult {
    pub user: AppUser,
}
