//! Request execution and response classification
//!
//! Every platform call goes through `HttpTransport`, which guarantees the
//! caller receives exactly one of: the parsed payload or an `AcrolinxError`.
//!
//! Classification order:
//! 1. no response at all -> `http_connection_problem` (cause kept)
//! 2. non-2xx -> embedded structured error, OAuth error, or `http_error_status`
//! 3. 2xx with a body that is not JSON -> `invalid_json`
//! 4. 2xx JSON carrying an `error` member -> same as (2)

use crate::error::{AcrolinxError, ErrorType, HttpRequest, Result};
use crate::headers::{common_headers, insert_headers};
use common::{EndpointConfig, ServiceType};
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Per-request additions: extra headers and an auth scheme override.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub service_type: Option<ServiceType>,
}

impl RequestOptions {
    pub fn service(service_type: ServiceType) -> Self {
        Self {
            headers: Vec::new(),
            service_type: Some(service_type),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// HTTP client bound to one platform configuration. Cheap to clone.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<EndpointConfig>,
}

impl HttpTransport {
    /// Build a transport with its own client. Cookies are kept between
    /// requests only when `cors_with_credentials` is set.
    pub fn new(config: EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(config.cors_with_credentials)
            .build()
            .map_err(|e| {
                AcrolinxError::new(ErrorType::Client, "Http Client Error", e.to_string())
                    .with_cause(e)
            })?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: EndpointConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Copy of this transport that sends a different client locale.
    pub fn with_client_locale(&self, locale: impl Into<String>) -> Self {
        let mut config = (*self.config).clone();
        config.client_locale = Some(locale.into());
        Self {
            client: self.client.clone(),
            config: Arc::new(config),
        }
    }

    pub fn url_of_path(&self, path: &str) -> String {
        format!("{}{}", self.config.acrolinx_url, path)
    }

    pub fn headers_for(&self, access_token: Option<&str>, opts: &RequestOptions) -> HeaderMap {
        let service_type = opts.service_type.unwrap_or(self.config.service_type);
        let mut headers = common_headers(&self.config, access_token, service_type);
        insert_headers(
            &mut headers,
            opts.headers.iter().map(|(n, v)| (n.as_str(), v.as_str())),
        );
        headers
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        let request = HttpRequest::new("GET", url);
        let builder = self
            .client
            .get(url)
            .headers(self.headers_for(access_token, opts));
        let response = self.execute(&request, builder).await?;
        read_json(&request, response).await
    }

    pub async fn get_json_from_path<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        self.get_json(&self.url_of_path(path), access_token, opts)
            .await
    }

    /// Send a JSON body with the given method to an absolute URL.
    pub async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &B,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        let request = HttpRequest::new(method.as_str(), url);
        let builder = self
            .client
            .request(method, url)
            .headers(self.headers_for(access_token, opts))
            .json(body);
        let response = self.execute(&request, builder).await?;
        read_json(&request, response).await
    }

    pub async fn post_json_to_path<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        self.send_json(Method::POST, &self.url_of_path(path), body, access_token, opts)
            .await
    }

    pub async fn put_json_to_path<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        self.send_json(Method::PUT, &self.url_of_path(path), body, access_token, opts)
            .await
    }

    pub async fn delete_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<T> {
        let request = HttpRequest::new("DELETE", url);
        let builder = self
            .client
            .delete(url)
            .headers(self.headers_for(access_token, opts));
        let response = self.execute(&request, builder).await?;
        read_json(&request, response).await
    }

    /// Fetch a body as plain text. Error responses are classified as usual.
    pub async fn get_text(
        &self,
        url: &str,
        access_token: Option<&str>,
        opts: &RequestOptions,
    ) -> Result<String> {
        let request = HttpRequest::new("GET", url);
        let builder = self
            .client
            .get(url)
            .headers(self.headers_for(access_token, opts));
        let response = self.execute(&request, builder).await?;
        let status = response.status();
        let text = read_body(&request, response).await?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(error_from_failed_response(&request, status, &text))
        }
    }

    /// Form-encoded POST to an identity provider. Platform headers are not sent.
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<T> {
        let request = HttpRequest::new("POST", url);
        let builder = self.client.post(url).form(form);
        let response = self.execute(&request, builder).await?;
        read_json(&request, response).await
    }

    async fn execute(
        &self,
        request: &HttpRequest,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response> {
        let log_http = self.config.enable_http_logging;
        if log_http {
            info!(method = %request.method, url = %request.url, "fetch");
        } else {
            debug!(method = %request.method, url = %request.url, "fetch");
        }

        match builder.send().await {
            Ok(response) => {
                if log_http {
                    info!(
                        status = response.status().as_u16(),
                        url = %request.url,
                        "fetched result"
                    );
                }
                Ok(response)
            }
            Err(e) => {
                if log_http {
                    error!(error = %e, url = %request.url, "fetch error");
                }
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "request"
                };
                Err(AcrolinxError::connection_problem(request.clone(), e, kind))
            }
        }
    }
}

async fn read_body(request: &HttpRequest, response: reqwest::Response) -> Result<String> {
    response
        .text()
        .await
        .map_err(|e| AcrolinxError::connection_problem(request.clone(), e, "body"))
}

async fn read_json<T: DeserializeOwned>(
    request: &HttpRequest,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    let text = read_body(request, response).await?;

    if !status.is_success() {
        return Err(error_from_failed_response(request, status, &text));
    }

    let value: Value = serde_json::from_str(&text)
        .map_err(|e| AcrolinxError::invalid_json(Some(request.clone()), e.to_string()))?;

    if let Some(embedded) = value.get("error").filter(|e| is_truthy(e)) {
        return Err(AcrolinxError::from_response_body(request, status, embedded));
    }

    serde_json::from_value(value)
        .map_err(|e| AcrolinxError::invalid_json(Some(request.clone()), e.to_string()))
}

fn error_from_failed_response(request: &HttpRequest, status: StatusCode, text: &str) -> AcrolinxError {
    match serde_json::from_str::<Value>(text) {
        Ok(body) => match body.get("error").filter(|e| e.is_object()) {
            Some(embedded) => AcrolinxError::from_response_body(request, status, embedded),
            None => AcrolinxError::from_response_body(request, status, &body),
        },
        Err(_) => AcrolinxError::unknown_status(request, status, text),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
