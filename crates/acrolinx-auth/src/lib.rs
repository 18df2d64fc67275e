//! Acrolinx sign-in library
//!
//! Two ways to obtain an access token for the platform:
//!
//! Browser sign-in (`signin`):
//! 1. `sign_in()` with a stored token or SSO credentials succeeds directly
//! 2. Otherwise it returns interactive links; the user opens `links.interactive`
//! 3. `poll_for_sign_in()` until the platform reports success
//!
//! Device authorization grant (`device_grant`), for headless integrations:
//! 1. `device_auth_sign_in()` tries the cached refresh token first
//! 2. If rejected, the user enters `user_code` at `verification_url`
//! 3. `poll_for_device_token()` until granted, denied, or expired
//!
//! All failures surface as `acrolinx_http::AcrolinxError`.

pub mod constants;
pub mod device_grant;
pub mod signin;

pub use constants::*;
pub use device_grant::{
    DeviceGrantEndpoints, DeviceGrantSession, DeviceGrantState, DeviceGrantToken,
    DeviceSignInOptions, DeviceSignInResult, device_auth_sign_in, device_auth_sign_in_interactive,
    fetch_login_info, poll_for_device_token, refresh_device_token, start_device_auth,
};
pub use signin::{
    Addon, AddonLinks, AuthorizationType, IntegrationInfo, InteractiveSignInOptions, SignInLinks,
    SignInOptions, SignInResult, SignInSuccess, SignInUser, poll_for_sign_in, sign_in,
    sign_in_interactive, sign_in_with_sso,
};
