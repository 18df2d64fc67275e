//! In-process fake Acrolinx platform for endpoint tests

use crate::endpoint::AcrolinxEndpoint;
use acrolinx_http::Clock;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::EndpointConfig;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const DUMMY_ACCESS_TOKEN: &str = "dummyAccessToken";
pub const APP_SIGNATURE: &str = "dummyAppSignature";
pub const APP_ACCESS_TOKEN: &str = "dummyAppAccessToken";
/// Content that the mock checks synchronously.
pub const INSTANT_CONTENT: &str = "instant";

pub struct MockPlatform {
    base: String,
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    base: Mutex<String>,
    pending_polls: usize,
    check_polls: AtomicUsize,
    cancel_requests: AtomicUsize,
    analysis_polls: AtomicUsize,
    int_config_requests: AtomicUsize,
    telemetry_enabled: Mutex<bool>,
    last_check_request: Mutex<Option<Value>>,
    last_body: Mutex<Option<Value>>,
    last_headers: Mutex<Option<HeaderMap>>,
}

impl MockState {
    fn base(&self) -> String {
        self.base.lock().unwrap().clone()
    }

    fn remember(&self, headers: &HeaderMap, body: Option<&Value>) {
        *self.last_headers.lock().unwrap() = Some(headers.clone());
        if let Some(body) = body {
            *self.last_body.lock().unwrap() = Some(body.clone());
        }
    }
}

type Shared = State<Arc<MockState>>;

impl MockPlatform {
    /// Start a mock whose checks report progress `pending_polls` times before
    /// returning the result.
    pub async fn start(pending_polls: usize) -> Self {
        let state = Arc::new(MockState {
            pending_polls,
            ..MockState::default()
        });
        let app = Router::new()
            .route("/api/v1/", get(platform_information))
            .route("/api/v1/capabilities", get(capabilities))
            .route("/api/v1/checking/capabilities", get(checking_capabilities))
            .route("/api/v1/configuration/features", get(features))
            .route("/api/v1/checking/checks", post(submit_check))
            .route(
                "/api/v1/checking/checks/{id}",
                get(poll_check).delete(cancel_check),
            )
            .route("/api/v1/checking/{batch}/contentanalysis", get(content_analysis))
            .route("/api/v1/checking/aggregation/{batch}", get(aggregation))
            .route("/api/v1/apps/analyses", post(submit_analysis))
            .route("/api/v1/apps/analyses/{id}", get(poll_analysis))
            .route("/api/v1/apps/accessToken/{app_id}", post(app_access_token))
            .route("/api/v1/apps/whoami", get(whoami))
            .route("/api/v1/user/{id}", get(user).put(put_user))
            .route("/api/v1/document/{id}", get(document).put(put_document))
            .route("/api/v1/dictionary/capabilities", get(dictionary_capabilities))
            .route("/api/v1/dictionary/submit", post(dictionary_submit))
            .route(
                "/api/v1/broadcasts/platform-notifications/{since}",
                get(notifications),
            )
            .route(
                "/api/v1/broadcasts/platform-notifications/",
                post(post_notifications),
            )
            .route("/api/v1/reports/term-harvesting/{id}", get(term_harvesting))
            .route(
                "/reuse-service/api/v1/phrases/preferred/with-description",
                post(live_search),
            )
            .route("/int-service/api/v1/config", get(int_config))
            .route("/ai-service/api/v1/tenants/features/ai", get(ai_features))
            .route("/ai-service/api/v1/tenants/feature/ai-enabled", get(ai_enabled))
            .route("/ai-service/api/v1/ai/chat-completions", post(chat_completion))
            .route("/text", get(|| async { "plain text body" }))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        *state.base.lock().unwrap() = base.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base, state }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn config(&self) -> EndpointConfig {
        let mut config = EndpointConfig::new(&self.base, "dummyClientSignature", "1.2.3.4");
        config.enable_telemetry = false;
        config
    }

    pub fn set_telemetry_enabled(&self, enabled: bool) {
        *self.state.telemetry_enabled.lock().unwrap() = enabled;
    }

    pub fn check_polls(&self) -> usize {
        self.state.check_polls.load(Ordering::SeqCst)
    }

    pub fn cancel_requests(&self) -> usize {
        self.state.cancel_requests.load(Ordering::SeqCst)
    }

    pub fn int_config_requests(&self) -> usize {
        self.state.int_config_requests.load(Ordering::SeqCst)
    }

    pub fn last_check_request(&self) -> Option<Value> {
        self.state.last_check_request.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.state.last_body.lock().unwrap().clone()
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.state
            .last_headers
            .lock()
            .unwrap()
            .as_ref()?
            .get(name)?
            .to_str()
            .ok()
            .map(str::to_owned)
    }
}

pub fn endpoint_for(mock: &MockPlatform, clock: Arc<dyn Clock>) -> AcrolinxEndpoint {
    AcrolinxEndpoint::builder(mock.config())
        .clock(clock)
        .build()
        .unwrap()
}

fn api_error(status: StatusCode, error_type: &str, title: &str) -> Response {
    (
        status,
        Json(json!({
            "type": error_type,
            "title": title,
            "detail": format!("{title} (mock)"),
            "status": status.as_u16()
        })),
    )
        .into_response()
}

fn bearer_ok(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {token}"))
}

pub fn check_result_json(id: &str) -> Value {
    json!({
        "id": id,
        "checkOptions": {"guidanceProfileId": "en-marketing"},
        "dictionaryScopes": ["language", "document"],
        "document": {"id": "doc-1", "customFields": []},
        "quality": {"score": 71.5, "status": "yellow"},
        "counts": {"sentences": 1, "words": 5, "issues": 1},
        "goals": [{"id": "clarity", "displayName": "Clarity", "color": "#1f77b4", "issues": 1}],
        "issues": [{
            "internalName": "simplify",
            "displayNameHtml": "Simplify",
            "guidanceHtml": "Use simple words.",
            "displaySurface": "textt",
            "goalId": "clarity",
            "issueType": "actionable",
            "aiRephraseHint": "Fix the spelling of textt.",
            "positionalInformation": {
                "hashes": {"issue": "h1", "environment": "h2", "index": "h3"},
                "matches": [{
                    "extractedPart": "textt", "extractedBegin": 5, "extractedEnd": 10,
                    "originalPart": "textt", "originalBegin": 5, "originalEnd": 10
                }]
            },
            "suggestions": [{"surface": "text", "groupId": "g1", "iconId": "preferred", "replacements": ["text"]}],
            "canAddToDictionary": true
        }],
        "reports": {
            "termHarvesting": {
                "link": "http://reports/term-harvesting/check-1",
                "linkAuthenticated": "http://reports/term-harvesting/check-1?auth"
            }
        }
    })
}

async fn platform_information() -> Json<Value> {
    Json(json!({
        "data": {"server": {"version": "2024.1.0", "name": "Acrolinx Platform"}, "locales": ["en", "de"]},
        "links": {"signIn": "/api/v1/auth/sign-ins"}
    }))
}

fn checking_capabilities_json() -> Value {
    json!({
        "guidanceProfiles": [{
            "id": "en-marketing",
            "displayName": "Marketing (English)",
            "language": {"id": "en", "displayName": "English"},
            "goals": [{"id": "clarity", "displayName": "Clarity", "color": "#1f77b4"}],
            "termSets": [],
            "status": "ready"
        }],
        "contentFormats": [{"id": "TEXT", "displayName": "Plain Text"}],
        "contentEncodings": ["none", "base64"],
        "checkTypes": ["batch", "interactive"],
        "reportTypes": ["termHarvesting", "scorecard"],
        "referencePattern": "\\.(txt|xml)$"
    })
}

async fn capabilities(headers: HeaderMap) -> Response {
    if !bearer_ok(&headers, DUMMY_ACCESS_TOKEN) {
        return api_error(StatusCode::UNAUTHORIZED, "auth", "Unauthorized");
    }
    Json(json!({
        "data": {
            "checking": checking_capabilities_json(),
            "document": {"customFields": [{
                "displayName": "Project", "key": "project", "inputType": "required",
                "type": "list", "possibleValues": ["alpha", "beta"]
            }]}
        },
        "links": {}
    }))
    .into_response()
}

async fn checking_capabilities() -> Json<Value> {
    Json(json!({"data": checking_capabilities_json(), "links": {}}))
}

async fn features() -> Json<Value> {
    Json(json!({"data": {"features": {"enableTargetService": true}}, "links": {}}))
}

async fn submit_check(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    *state.last_check_request.lock().unwrap() = Some(body.clone());
    if body["content"] == INSTANT_CONTENT {
        return Json(json!({"data": check_result_json("instant"), "links": {}}));
    }
    let link = format!("{}/api/v1/checking/checks/check-1", state.base());
    Json(json!({
        "data": {"id": "check-1"},
        "links": {"result": link, "cancel": link}
    }))
}

async fn poll_check(State(state): Shared, Path(id): Path<String>) -> Response {
    if id == "missing" {
        return api_error(StatusCode::NOT_FOUND, "not_found", "Not found");
    }
    let polls = state.check_polls.fetch_add(1, Ordering::SeqCst) + 1;
    if polls <= state.pending_polls {
        let link = format!("{}/api/v1/checking/checks/{id}", state.base());
        return Json(json!({
            "progress": {"percent": 50, "message": "Checking", "retryAfter": 1},
            "links": {"poll": link}
        }))
        .into_response();
    }
    Json(json!({"data": check_result_json(&id), "links": {}})).into_response()
}

async fn cancel_check(State(state): Shared, Path(id): Path<String>) -> Json<Value> {
    state.cancel_requests.fetch_add(1, Ordering::SeqCst);
    Json(json!({"data": {"id": id}, "links": {}}))
}

async fn content_analysis(Path(batch): Path<String>) -> Json<Value> {
    let links = if batch == "batch-1" {
        json!([
            {"linkType": "shortWithAccessToken", "link": "http://dashboard/s/abc?token"},
            {"linkType": "shortWithoutAccessToken", "link": "http://dashboard/s/abc"}
        ])
    } else {
        json!([])
    };
    Json(json!({"data": {"links": links}, "links": {}}))
}

async fn aggregation(Path(batch): Path<String>) -> Json<Value> {
    Json(json!({
        "data": {"reports": [{"reportType": "withoutApiKey", "link": format!("http://reports/{batch}")}]},
        "links": {}
    }))
}

async fn submit_analysis(
    State(state): Shared,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let app = headers.get("x-acrolinx-app").and_then(|v| v.to_str().ok());
    if app != body["appSignature"].as_str() {
        return api_error(StatusCode::FORBIDDEN, "appSignatureRejected", "App signature rejected");
    }
    Json(json!({
        "data": {"id": "analysis-1"},
        "links": {"result": format!("{}/api/v1/apps/analyses/analysis-1", state.base())}
    }))
    .into_response()
}

async fn poll_analysis(State(state): Shared, headers: HeaderMap) -> Response {
    if headers.get("x-acrolinx-app").is_none() {
        return api_error(StatusCode::FORBIDDEN, "appSignatureRejected", "App signature missing");
    }
    if state.analysis_polls.fetch_add(1, Ordering::SeqCst) == 0 {
        return Json(json!({"progress": {"percent": 10, "retryAfter": 1}, "links": {}}))
            .into_response();
    }
    Json(json!({
        "data": {
            "options": {"contentFormat": "HTML", "languageId": "en"},
            "extracted": {"link": "http://reports/analysis-1/extracted", "linkAuthenticated": "http://reports/analysis-1/extracted?auth"}
        },
        "links": {}
    }))
    .into_response()
}

async fn app_access_token(headers: HeaderMap, Path(app_id): Path<String>) -> Response {
    if !bearer_ok(&headers, DUMMY_ACCESS_TOKEN) {
        return api_error(StatusCode::UNAUTHORIZED, "auth", "Unauthorized");
    }
    Json(json!({
        "data": {
            "appAccessToken": APP_ACCESS_TOKEN,
            "user": {"id": "user-1", "username": "jane"},
            "appId": app_id
        },
        "links": {}
    }))
    .into_response()
}

async fn whoami(headers: HeaderMap) -> Response {
    if !bearer_ok(&headers, APP_ACCESS_TOKEN) {
        return api_error(StatusCode::UNAUTHORIZED, "auth", "Invalid app token");
    }
    Json(json!({"data": {"user": {"id": "user-1", "username": "jane"}}, "links": {}})).into_response()
}

async fn user(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "data": {
            "id": id,
            "signIn": "jane@example.com",
            "fullName": "Jane Doe",
            "tenantId": "acme",
            "properties": {"department": "docs"},
            "customFields": [{
                "displayName": "Team", "key": "team", "inputType": "required",
                "type": "text", "value": null
            }]
        },
        "links": {}
    }))
}

async fn put_user(
    State(state): Shared,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    state.remember(&headers, Some(&body));
    if body["id"] != id.as_str() {
        return api_error(StatusCode::BAD_REQUEST, "customFieldsIncorrect", "Id mismatch");
    }
    Json(json!({"data": {"id": id, "customFields": as_custom_fields(&body)}, "links": {}})).into_response()
}

async fn document(Path(id): Path<String>) -> Json<Value> {
    // No customFields member: the client must still return an empty list.
    Json(json!({"data": {"id": id}, "links": {}}))
}

async fn put_document(
    State(state): Shared,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.remember(&headers, Some(&body));
    Json(json!({"data": {"id": id, "customFields": as_custom_fields(&body)}, "links": {}}))
}

fn as_custom_fields(body: &Value) -> Value {
    body["customFields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .map(|f| {
                    json!({
                        "displayName": f["key"], "key": f["key"], "inputType": "required",
                        "type": "text", "value": f["value"]
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into()
}

async fn dictionary_capabilities() -> Json<Value> {
    Json(json!({"data": {"scopes": ["language", "guidanceProfile", "document"]}, "links": {}}))
}

async fn dictionary_submit(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    state.remember(&headers, Some(&body));
    Json(json!({"data": body, "links": {}}))
}

async fn notifications(Path(since): Path<u64>) -> Json<Value> {
    Json(json!({
        "data": {
            "requestTimeInMilliseconds": since + 1000,
            "platformNotifications": [{
                "id": "n-1", "importance": "HIGH", "title": "Maintenance",
                "body": "Tonight", "start": since, "end": since + 3_600_000
            }]
        },
        "links": {}
    }))
}

async fn post_notifications() -> Response {
    api_error(StatusCode::FORBIDDEN, "insufficientPrivileges", "Insufficient privileges")
}

async fn term_harvesting(Path(id): Path<String>) -> Json<Value> {
    Json(json!({
        "data": {"terms": [{"displaySurface": "widget", "occurrences": [], "links": {"contribute": format!("http://terms/{id}")}}]},
        "links": {}
    }))
}

async fn live_search(headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !bearer_ok(&headers, DUMMY_ACCESS_TOKEN) {
        return api_error(StatusCode::UNAUTHORIZED, "auth", "Unauthorized");
    }
    Json(json!({
        "requestId": body["requestId"],
        "results": [{"preferredPhrase": "sign in", "description": "Use instead of log in"}]
    }))
    .into_response()
}

async fn int_config(State(state): Shared) -> Json<Value> {
    state.int_config_requests.fetch_add(1, Ordering::SeqCst);
    let enabled = *state.telemetry_enabled.lock().unwrap();
    Json(json!({"telemetryEnabled": enabled, "activateGetSuggestionReplacement": false}))
}

async fn ai_features() -> Json<Value> {
    Json(json!({"ai": true, "aiAssistant": false}))
}

async fn ai_enabled(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("privilege").map(String::as_str) != Some("generate") {
        return api_error(StatusCode::BAD_REQUEST, "client", "privilege missing");
    }
    Json(json!({"tenant": "acme", "value": true, "userHasPrivilege": true})).into_response()
}

async fn chat_completion(State(state): Shared, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.remember(&headers, Some(&body));
    if body["prompt"].as_str().unwrap_or_default().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"httpErrorCode": 400, "errorTitle": "Bad request", "errorDescription": "prompt missing"})),
        )
            .into_response();
    }
    Json(json!({"response": format!("rewritten: {}", body["prompt"].as_str().unwrap_or_default())}))
        .into_response()
}
