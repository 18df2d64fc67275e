//! Sign-in constants

use std::time::Duration;

/// Signature for integrations under development. Certified integrations
/// receive their own signature.
pub const DEVELOPMENT_SIGNATURE: &str = "SW50ZWdyYXRpb25EZXZlbG9wbWVudERlbW9Pbmx5";

/// Sign-in entry point of the platform
pub const SIGN_IN_PATH: &str = "/api/v1/auth/sign-ins";

/// How long `sign_in_interactive` waits for the user by default.
pub const DEFAULT_INTERACTIVE_SIGN_IN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Public OAuth client used for the device authorization grant
pub const DEFAULT_DEVICE_CLIENT_ID: &str = "acrolinx-integrations";

pub const DEVICE_GRANT_SCOPE: &str = "openid profile email";

pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// RFC 8628 section 3.5: increase the polling interval by 5 seconds on `slow_down`.
pub const SLOW_DOWN_INCREMENT: Duration = Duration::from_secs(5);

/// Login discovery for a tenant. `{tenant}` is replaced with the URL-encoded tenant id.
pub const LOGIN_INFO_PATH: &str = "/api/v1/auth/tenants/{tenant}/login-info";
