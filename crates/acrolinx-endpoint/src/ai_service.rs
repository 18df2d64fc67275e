//! AI rewrite suggestions (`/ai-service/api/v1`)
//!
//! Always authenticated with a bearer token, whatever the endpoint's service type.

use crate::check::Issue;
use crate::endpoint::AcrolinxEndpoint;
use acrolinx_http::{RequestOptions, Result, ServiceType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const AI_SERVICE_BASE_PATH: &str = "/ai-service/api/v1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiFeatures {
    pub ai: bool,
    pub ai_assistant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IsAiEnabledInformation {
    pub tenant: String,
    /// AI is switched on for the tenant.
    pub value: bool,
    pub user_has_privilege: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    pub prompt: String,
    pub target_uuid: String,
    pub count: u32,
    pub issue_internal_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
}

impl ChatCompletionRequest {
    /// Request for a rewrite of `issue`. `None` when the platform gave no
    /// rephrase hint for it.
    pub fn for_issue(issue: &Issue, target_uuid: impl Into<String>, count: u32) -> Option<Self> {
        let prompt = issue.ai_rephrase_hint.as_deref().filter(|h| !h.is_empty())?;
        Some(Self {
            prompt: prompt.to_owned(),
            target_uuid: target_uuid.into(),
            count,
            issue_internal_name: issue.internal_name.clone(),
            previous_version: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteResponse {
    pub response: String,
}

fn ai_options() -> RequestOptions {
    RequestOptions::service(ServiceType::AcrolinxOne)
}

fn ai_path(path: &str) -> String {
    format!("{AI_SERVICE_BASE_PATH}{path}")
}

impl AcrolinxEndpoint {
    pub async fn get_ai_features(&self, access_token: &str) -> Result<AiFeatures> {
        self.transport()
            .get_json_from_path(&ai_path("/tenants/features/ai"), Some(access_token), &ai_options())
            .await
    }

    pub async fn get_ai_enabled(&self, access_token: &str) -> Result<IsAiEnabledInformation> {
        self.transport()
            .get_json_from_path(
                &ai_path("/tenants/feature/ai-enabled?privilege=generate"),
                Some(access_token),
                &ai_options(),
            )
            .await
    }

    /// True when the tenant has AI switched on and the user may use it.
    /// Errors count as "no".
    pub async fn is_ai_enabled(&self, access_token: &str) -> bool {
        match self.get_ai_enabled(access_token).await {
            Ok(info) => info.value && info.user_has_privilege,
            Err(e) => {
                warn!(error = %e, "AI availability check failed");
                false
            }
        }
    }

    pub async fn get_ai_chat_completion(
        &self,
        access_token: &str,
        request: &ChatCompletionRequest,
    ) -> Result<WriteResponse> {
        let instruments = self.instruments(access_token).await;
        if let Some(instruments) = &instruments {
            instruments.record_suggestion_requested();
        }

        let started = self.clock().now();
        let response: WriteResponse = self
            .transport()
            .post_json_to_path(&ai_path("/ai/chat-completions"), request, Some(access_token), &ai_options())
            .await?;
        let elapsed = self.clock().now().saturating_duration_since(started);
        debug!(
            issue = %request.issue_internal_name,
            elapsed_secs = elapsed.as_secs_f64(),
            "AI suggestion received"
        );

        if let Some(instruments) = &instruments {
            instruments.record_suggestion_response_time(elapsed);
        }
        Ok(response)
    }
}
