//! `AcrolinxEndpoint`: one configured connection to an Acrolinx platform

use crate::addons::{
    AppAccessTokenApiResult, AppAccessTokenResult, AppAccessTokenValidationResult, HttpGetRequest,
    VALIDATE_APP_ACCESS_TOKEN_PATH,
};
use crate::capabilities::{
    CheckingCapabilities, PlatformCapabilities, PlatformFeatures, PlatformFeaturesResponse,
    PlatformInformation,
};
use crate::check::{
    AggregatedReportLinkResult, ContentAnalysisDashboardResult, LiveSearchRequest,
    LiveSearchResponse, Report, TermHarvestingReport,
};
use crate::dictionary::{AddToDictionaryRequest, AddToDictionaryResponse, DictionaryCapabilities};
use crate::document::DocumentDescriptor;
use crate::notifications::{
    ServerNotification, ServerNotificationPost, ServerNotificationResponseData,
};
use crate::user::{CustomFieldsUpdate, KeyValuePair, User};
use acrolinx_auth::{
    DeviceGrantSession, DeviceGrantToken, DeviceSignInOptions, DeviceSignInResult,
    InteractiveSignInOptions, SignInLinks, SignInOptions, SignInResult, SignInSuccess,
};
use acrolinx_http::{
    AcrolinxError, ApiResponse, Clock, ErrorType, HttpTransport, PollOutcome, Progress,
    RequestOptions, Result, ServiceType, TokioClock,
};
use acrolinx_telemetry::{
    InstrumentationRegistry, Instruments, IntService, IntServiceSink, LogBuffer, LogBufferConfig,
};
use common::{EndpointConfig, Secret};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PLATFORM_INFORMATION_PATH: &str = "/api/v1/";
const CAPABILITIES_PATH: &str = "/api/v1/capabilities";
const CHECKING_CAPABILITIES_PATH: &str = "/api/v1/checking/capabilities";
const FEATURES_PATH: &str = "/api/v1/configuration/features";
const LIVE_SEARCH_PATH: &str = "/reuse-service/api/v1/phrases/preferred/with-description";
const NOTIFICATIONS_PATH: &str = "/api/v1/broadcasts/platform-notifications/";
const DICTIONARY_CAPABILITIES_PATH: &str = "/api/v1/dictionary/capabilities";
const DICTIONARY_SUBMIT_PATH: &str = "/api/v1/dictionary/submit";
const DASHBOARD_LINK_TYPE: &str = "shortWithoutAccessToken";

/// Entry point for every platform operation. Cheap to clone.
#[derive(Clone)]
pub struct AcrolinxEndpoint {
    transport: HttpTransport,
    clock: Arc<dyn Clock>,
    instrumentation: Arc<InstrumentationRegistry>,
    int_service: IntService,
}

pub struct EndpointBuilder {
    config: EndpointConfig,
    clock: Option<Arc<dyn Clock>>,
    instrumentation: Option<Arc<InstrumentationRegistry>>,
    client: Option<reqwest::Client>,
}

impl EndpointBuilder {
    /// Time source for poll waits. Defaults to `TokioClock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share one registry between endpoints so telemetry is set up once per platform.
    pub fn instrumentation(mut self, registry: Arc<InstrumentationRegistry>) -> Self {
        self.instrumentation = Some(registry);
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<AcrolinxEndpoint> {
        validate_base_url(&self.config.acrolinx_url)?;
        let transport = match self.client {
            Some(client) => HttpTransport::with_client(client, self.config),
            None => HttpTransport::new(self.config)?,
        };
        info!(url = %transport.config().acrolinx_url, "endpoint created");
        Ok(AcrolinxEndpoint {
            int_service: IntService::new(transport.clone()),
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(TokioClock)),
            instrumentation: self.instrumentation.unwrap_or_default(),
        })
    }
}

fn validate_base_url(raw: &str) -> Result<()> {
    let invalid = |detail: String| {
        AcrolinxError::new(ErrorType::InvalidBaseUrl, "Invalid base URL", detail)
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(format!("{raw}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid(format!("{raw}: expected an http(s) URL with a host")));
    }
    Ok(())
}

impl AcrolinxEndpoint {
    pub fn new(config: EndpointConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: EndpointConfig) -> EndpointBuilder {
        EndpointBuilder {
            config,
            clock: None,
            instrumentation: None,
            client: None,
        }
    }

    pub fn config(&self) -> &EndpointConfig {
        self.transport.config()
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn int_service(&self) -> &IntService {
        &self.int_service
    }

    /// Locale sent with core-platform requests from now on.
    pub fn set_client_locale(&mut self, locale: impl Into<String>) {
        self.transport = self.transport.with_client_locale(locale);
        self.int_service = IntService::new(self.transport.clone());
    }

    /// Server version and supported locales. No sign-in needed.
    pub async fn get_platform_information(&self) -> Result<PlatformInformation> {
        let response: ApiResponse<PlatformInformation> = self
            .transport
            .get_json_from_path(PLATFORM_INFORMATION_PATH, None, &RequestOptions::default())
            .await?;
        Ok(response.data)
    }

    // -- Sign-in ----------------------------------------------------------

    pub async fn sign_in(&self, options: &SignInOptions) -> Result<SignInResult> {
        acrolinx_auth::sign_in(&self.transport, options).await
    }

    pub async fn poll_for_sign_in(
        &self,
        links: &SignInLinks,
        last_progress: Option<&Progress>,
    ) -> Result<PollOutcome<SignInSuccess>> {
        acrolinx_auth::poll_for_sign_in(&self.transport, self.clock(), links, last_progress).await
    }

    pub async fn sign_in_interactive(
        &self,
        options: &InteractiveSignInOptions,
        on_sign_in_url: impl FnOnce(&str),
    ) -> Result<SignInSuccess> {
        acrolinx_auth::sign_in_interactive(&self.transport, self.clock(), options, on_sign_in_url)
            .await
    }

    pub async fn sign_in_with_sso(
        &self,
        generic_token: Secret<String>,
        username: impl Into<String>,
    ) -> Result<SignInSuccess> {
        acrolinx_auth::sign_in_with_sso(&self.transport, generic_token, username).await
    }

    pub async fn device_auth_sign_in(&self, options: &DeviceSignInOptions) -> Result<DeviceSignInResult> {
        acrolinx_auth::device_auth_sign_in(&self.transport, options).await
    }

    pub async fn device_auth_sign_in_interactive(
        &self,
        options: &DeviceSignInOptions,
        on_user_action: impl FnOnce(&DeviceGrantSession),
    ) -> Result<DeviceGrantToken> {
        acrolinx_auth::device_auth_sign_in_interactive(
            &self.transport,
            self.clock(),
            options,
            on_user_action,
        )
        .await
    }

    pub async fn start_device_auth(
        &self,
        tenant_id: &str,
        client_id: Option<&str>,
    ) -> Result<DeviceGrantSession> {
        acrolinx_auth::start_device_auth(&self.transport, tenant_id, client_id).await
    }

    pub async fn poll_for_device_token(
        &self,
        session: &DeviceGrantSession,
        timeout: Option<Duration>,
    ) -> Result<DeviceGrantToken> {
        acrolinx_auth::poll_for_device_token(&self.transport, self.clock(), session, timeout).await
    }

    // -- Add-on apps ------------------------------------------------------

    /// Token for an add-on app, with a ready-made request the app can use to
    /// validate it.
    pub async fn get_app_access_token(
        &self,
        access_token: &str,
        app_id: &str,
    ) -> Result<AppAccessTokenResult> {
        let path = format!("/api/v1/apps/accessToken/{}", urlencoding::encode(app_id));
        let response: ApiResponse<AppAccessTokenApiResult> = self
            .transport
            .post_json_to_path(&path, &json!({}), Some(access_token), &RequestOptions::default())
            .await?;
        let result = response.data;

        let headers: BTreeMap<String, String> = self
            .transport
            .headers_for(Some(&result.app_access_token), &RequestOptions::default())
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();
        Ok(AppAccessTokenResult {
            validation_request: HttpGetRequest {
                url: self.transport.url_of_path(VALIDATE_APP_ACCESS_TOKEN_PATH),
                headers,
            },
            app_access_token: result.app_access_token,
            user: result.user,
            app_id: result.app_id,
        })
    }

    pub async fn validate_app_access_token(
        &self,
        app_access_token: &str,
    ) -> Result<AppAccessTokenValidationResult> {
        let response: ApiResponse<AppAccessTokenValidationResult> = self
            .transport
            .get_json_from_path(
                VALIDATE_APP_ACCESS_TOKEN_PATH,
                Some(app_access_token),
                &RequestOptions::default(),
            )
            .await?;
        Ok(response.data)
    }

    // -- Capabilities -----------------------------------------------------

    pub async fn get_capabilities(&self, access_token: &str) -> Result<PlatformCapabilities> {
        self.get_data(CAPABILITIES_PATH, access_token).await
    }

    pub async fn get_checking_capabilities(&self, access_token: &str) -> Result<CheckingCapabilities> {
        self.get_data(CHECKING_CAPABILITIES_PATH, access_token)
            .await
    }

    pub async fn get_features(&self, access_token: &str) -> Result<PlatformFeatures> {
        let response: PlatformFeaturesResponse = self.get_data(FEATURES_PATH, access_token).await?;
        Ok(response.features)
    }

    // -- Reports and suggestions ------------------------------------------

    /// Preferred phrases for a text fragment, from the reuse service.
    pub async fn get_live_suggestions(
        &self,
        access_token: &str,
        request: &LiveSearchRequest,
    ) -> Result<LiveSearchResponse> {
        self.transport
            .post_json_to_path(
                LIVE_SEARCH_PATH,
                request,
                Some(access_token),
                &RequestOptions::service(ServiceType::AcrolinxOne),
            )
            .await
    }

    pub async fn get_term_harvesting_report(
        &self,
        access_token: &str,
        report: &Report,
    ) -> Result<TermHarvestingReport> {
        let response: ApiResponse<TermHarvestingReport> = self
            .transport
            .get_json(&report.link, Some(access_token), &RequestOptions::default())
            .await?;
        Ok(response.data)
    }

    #[deprecated(note = "use get_content_analysis_dashboard")]
    pub async fn get_link_to_aggregated_report(
        &self,
        access_token: &str,
        batch_id: &str,
    ) -> Result<AggregatedReportLinkResult> {
        let path = format!("/api/v1/checking/aggregation/{}", urlencoding::encode(batch_id));
        self.get_data(&path, access_token).await
    }

    /// Dashboard link for all checks of a batch. The returned link carries no
    /// access token.
    pub async fn get_content_analysis_dashboard(
        &self,
        access_token: &str,
        batch_id: &str,
    ) -> Result<String> {
        let path = format!("/api/v1/checking/{}/contentanalysis", urlencoding::encode(batch_id));
        let result: ContentAnalysisDashboardResult = self.get_data(&path, access_token).await?;
        result
            .links
            .into_iter()
            .find(|l| l.link_type == DASHBOARD_LINK_TYPE)
            .map(|l| l.link)
            .ok_or_else(|| {
                AcrolinxError::new(
                    ErrorType::NotFound,
                    "Dashboard link not found",
                    format!("No {DASHBOARD_LINK_TYPE} link for batch {batch_id}"),
                )
                .with_request(acrolinx_http::HttpRequest::new(
                    "GET",
                    self.transport.url_of_path(&path),
                ))
            })
    }

    // -- Notifications ----------------------------------------------------

    /// Broadcasts published since `since_ms` (epoch milliseconds). Pass
    /// `request_time_in_milliseconds` from the previous answer to get only new ones.
    pub async fn get_server_notifications(
        &self,
        access_token: &str,
        since_ms: u64,
    ) -> Result<ApiResponse<ServerNotificationResponseData>> {
        self.transport
            .get_json_from_path(
                &format!("{NOTIFICATIONS_PATH}{since_ms}"),
                Some(access_token),
                &RequestOptions::default(),
            )
            .await
    }

    pub async fn post_server_notifications(
        &self,
        access_token: &str,
        notification: &ServerNotificationPost,
    ) -> Result<ApiResponse<ServerNotification>> {
        self.transport
            .post_json_to_path(
                NOTIFICATIONS_PATH,
                notification,
                Some(access_token),
                &RequestOptions::default(),
            )
            .await
    }

    // -- Dictionary -------------------------------------------------------

    pub async fn get_dictionary_capabilities(
        &self,
        access_token: &str,
    ) -> Result<DictionaryCapabilities> {
        self.get_data(DICTIONARY_CAPABILITIES_PATH, access_token)
            .await
    }

    pub async fn add_to_dictionary(
        &self,
        access_token: &str,
        request: &AddToDictionaryRequest,
    ) -> Result<AddToDictionaryResponse> {
        debug!(scope = ?request.scope(), "adding to dictionary");
        let response: ApiResponse<AddToDictionaryResponse> = self
            .transport
            .post_json_to_path(
                DICTIONARY_SUBMIT_PATH,
                request,
                Some(access_token),
                &RequestOptions::default(),
            )
            .await?;
        Ok(response.data)
    }

    // -- Users and documents ----------------------------------------------

    pub async fn get_user_data(&self, access_token: &str, user_id: &str) -> Result<User> {
        self.get_data(&user_path(user_id), access_token).await
    }

    pub async fn set_user_custom_fields(
        &self,
        access_token: &str,
        user_id: &str,
        custom_fields: &[KeyValuePair],
    ) -> Result<User> {
        self.put_custom_fields(&user_path(user_id), user_id, custom_fields, access_token)
            .await
    }

    pub async fn get_document_descriptor(
        &self,
        access_token: &str,
        document_id: &str,
    ) -> Result<DocumentDescriptor> {
        self.get_data(&document_path(document_id), access_token)
            .await
    }

    pub async fn set_document_custom_fields(
        &self,
        access_token: &str,
        document_id: &str,
        custom_fields: &[KeyValuePair],
    ) -> Result<DocumentDescriptor> {
        self.put_custom_fields(
            &document_path(document_id),
            document_id,
            custom_fields,
            access_token,
        )
        .await
    }

    async fn put_custom_fields<T: DeserializeOwned>(
        &self,
        path: &str,
        id: &str,
        custom_fields: &[KeyValuePair],
        access_token: &str,
    ) -> Result<T> {
        let body = CustomFieldsUpdate { id, custom_fields };
        let response: ApiResponse<T> = self
            .transport
            .put_json_to_path(path, &body, Some(access_token), &RequestOptions::default())
            .await?;
        Ok(response.data)
    }

    // -- Raw access -------------------------------------------------------

    /// GET a platform path and return the raw response, envelope included.
    pub async fn get_json_from_path<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T> {
        self.transport
            .get_json_from_path(path, Some(access_token), &RequestOptions::default())
            .await
    }

    pub async fn get_json_from_url<T: DeserializeOwned>(&self, url: &str, access_token: &str) -> Result<T> {
        self.transport
            .get_json(url, Some(access_token), &RequestOptions::default())
            .await
    }

    pub async fn post_json_to_path<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        access_token: &str,
    ) -> Result<T> {
        self.transport
            .post_json_to_path(path, body, Some(access_token), &RequestOptions::default())
            .await
    }

    pub async fn get_text_from_url(&self, url: &str, access_token: &str) -> Result<String> {
        self.transport
            .get_text(url, Some(access_token), &RequestOptions::default())
            .await
    }

    // -- Telemetry --------------------------------------------------------

    /// Usage instruments, or `None` when telemetry is off for this platform.
    pub async fn instruments(&self, access_token: &str) -> Option<Arc<Instruments>> {
        self.instrumentation
            .get_instruments(&self.int_service, self.config(), access_token)
            .await
    }

    pub fn instrumentation(&self) -> &InstrumentationRegistry {
        &self.instrumentation
    }

    /// Buffer that ships log entries to the integration service, if cloud
    /// logging is enabled in the configuration.
    pub fn cloud_log_buffer(&self, access_token: Secret<String>) -> Option<LogBuffer> {
        let settings = &self.config().logging;
        if !settings.enable_cloud_logging {
            return None;
        }
        let sink = IntServiceSink::new(self.int_service.clone(), access_token, &settings.app_name);
        Some(LogBuffer::new(LogBufferConfig::from(settings), Arc::new(sink)))
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str, access_token: &str) -> Result<T> {
        let response: ApiResponse<T> = self
            .transport
            .get_json_from_path(path, Some(access_token), &RequestOptions::default())
            .await?;
        Ok(response.data)
    }
}

fn user_path(user_id: &str) -> String {
    format!("/api/v1/user/{}", urlencoding::encode(user_id))
}

fn document_path(document_id: &str) -> String {
    format!("/api/v1/document/{}", urlencoding::encode(document_id))
}

/// `{data, links}` envelope with untyped data.
pub type RawApiResponse = ApiResponse<Value>;
