//! Request headers: client identification, auth and configured extras
//!
//! Two auth schemes exist. Acrolinx One services take a bearer token;
//! the core platform takes the legacy `X-Acrolinx-*` header set.

use common::{EndpointConfig, HeaderInjection, ServiceType};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;
use tracing::warn;

pub const HEADER_X_ACROLINX_CLIENT: &str = "X-Acrolinx-Client";
pub const HEADER_X_ACROLINX_AUTH: &str = "X-Acrolinx-Auth";
pub const HEADER_X_ACROLINX_BASE_URL: &str = "X-Acrolinx-Base-Url";
pub const HEADER_X_ACROLINX_CLIENT_LOCALE: &str = "X-Acrolinx-Client-Locale";
pub const HEADER_X_ACROLINX_APP_SIGNATURE: &str = "X-Acrolinx-App";

/// `"{signature}; {version}"`
pub fn client_header_value(config: &EndpointConfig) -> String {
    format!("{}; {}", config.client.signature, config.client.version)
}

/// Headers sent with every request for the given service type.
///
/// Blank access tokens are treated as absent. Configured custom headers are
/// added last but can never replace an auth header.
pub fn common_headers(
    config: &EndpointConfig,
    access_token: Option<&str>,
    service_type: ServiceType,
) -> HeaderMap {
    let access_token = access_token.filter(|t| !t.is_empty());
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut auth: Vec<(&str, String)> = Vec::new();
    match service_type {
        ServiceType::AcrolinxOne => {
            if let Some(token) = access_token {
                auth.push((AUTHORIZATION.as_str(), format!("Bearer {token}")));
            }
        }
        ServiceType::AcrolinxCore => {
            auth.push((HEADER_X_ACROLINX_BASE_URL, config.acrolinx_url.clone()));
            auth.push((HEADER_X_ACROLINX_CLIENT, client_header_value(config)));
            if let Some(locale) = config.client_locale.as_deref().filter(|l| !l.is_empty()) {
                auth.push((HEADER_X_ACROLINX_CLIENT_LOCALE, locale.to_owned()));
            }
            if let Some(token) = access_token {
                auth.push((HEADER_X_ACROLINX_AUTH, token.to_owned()));
            }
        }
    }
    insert_headers(&mut headers, auth.iter().map(|(n, v)| (*n, v.as_str())));
    inject_configured(&mut headers, &config.headers);
    headers
}

/// Insert name/value pairs, skipping anything that is not a valid header.
pub fn insert_headers<'a>(
    headers: &mut HeaderMap,
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) {
    for (name, value) in pairs {
        let Some((name, value)) = parse_header(name, value) else {
            continue;
        };
        headers.insert(name, value);
    }
}

fn inject_configured(headers: &mut HeaderMap, injections: &[HeaderInjection]) {
    for injection in injections {
        let Some((name, value)) = parse_header(&injection.name, &injection.value) else {
            continue;
        };
        if name == AUTHORIZATION || name.as_str().eq_ignore_ascii_case(HEADER_X_ACROLINX_AUTH) {
            warn!(header = %injection.name, "refusing to overwrite auth header from config");
            continue;
        }
        headers.insert(name, value);
    }
}

fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let header_name = match HeaderName::from_str(name) {
        Ok(n) => n,
        Err(e) => {
            warn!(header = %name, error = %e, "skipping invalid header name");
            return None;
        }
    };
    let header_value = match HeaderValue::from_str(value) {
        Ok(v) => v,
        Err(e) => {
            warn!(header = %name, error = %e, "skipping invalid header value");
            return None;
        }
    };
    Some((header_name, header_value))
}
