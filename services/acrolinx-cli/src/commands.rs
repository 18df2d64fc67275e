//! Command implementations. Results go to stdout as JSON, prompts to stderr.

use crate::cli::{CheckArgs, Command};
use acrolinx_endpoint::auth::{DeviceSignInOptions, InteractiveSignInOptions};
use acrolinx_endpoint::{
    AcrolinxEndpoint, CancellationToken, ChatCompletionRequest, CheckAndGetResultOptions,
    CheckOptions, CheckRequest, CheckResult, DocumentDescriptorRequest, ReportType,
};
use anyhow::{Context, Result};
use common::Secret;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

/// How many issues `ai-rewrite` asks suggestions for.
const MAX_AI_REWRITES: usize = 3;

pub async fn run(endpoint: &AcrolinxEndpoint, command: &Command) -> Result<()> {
    match command {
        Command::Info => {
            let info = endpoint.get_platform_information().await?;
            print_json(&info)
        }
        Command::SignIn => {
            let options = InteractiveSignInOptions {
                access_token: endpoint.config().access_token.clone(),
                timeout: None,
            };
            let success = endpoint
                .sign_in_interactive(&options, |url| {
                    eprintln!("Open this URL to sign in:\n  {url}");
                })
                .await?;
            info!(user = %success.user.username, "signed in");
            println!("{}", success.access_token);
            Ok(())
        }
        Command::DeviceSignIn { tenant_id } => {
            let mut options = DeviceSignInOptions::new(tenant_id);
            options.refresh_token = std::env::var("ACROLINX_REFRESH_TOKEN").ok().map(Secret::new);
            let token = endpoint
                .device_auth_sign_in_interactive(&options, |session| {
                    eprintln!(
                        "Go to {} and enter the code {}",
                        session.verification_url, session.user_code
                    );
                })
                .await?;
            println!("{}", token.access_token);
            Ok(())
        }
        Command::Capabilities => {
            let token = access_token(endpoint)?;
            let capabilities = endpoint.get_checking_capabilities(&token).await?;
            print_json(&capabilities)
        }
        Command::Check(args) => {
            let token = access_token(endpoint)?;
            let result = check_file(endpoint, &token, args).await?;
            print_json(&CheckSummary::from(&result))
        }
        Command::Dashboard { batch_id } => {
            let token = access_token(endpoint)?;
            let link = endpoint
                .get_content_analysis_dashboard(&token, batch_id)
                .await?;
            println!("{link}");
            Ok(())
        }
        Command::AiRewrite {
            file,
            guidance_profile_id,
        } => {
            let token = access_token(endpoint)?;
            if !endpoint.is_ai_enabled(&token).await {
                anyhow::bail!("AI suggestions are not available for this user");
            }
            let args = CheckArgs {
                file: file.clone(),
                guidance_profile_id: guidance_profile_id.clone(),
                ..CheckArgs::default()
            };
            let result = check_file(endpoint, &token, &args).await?;
            let mut rewrites = Vec::new();
            for issue in result.issues.iter() {
                let target = uuid::Uuid::new_v4().to_string();
                let Some(request) = ChatCompletionRequest::for_issue(issue, target, 1) else {
                    continue;
                };
                let response = endpoint.get_ai_chat_completion(&token, &request).await?;
                rewrites.push(json!({
                    "issue": issue.internal_name,
                    "surface": issue.display_surface,
                    "rewrite": response.response,
                }));
                if rewrites.len() == MAX_AI_REWRITES {
                    break;
                }
            }
            print_json(&rewrites)
        }
    }
}

async fn check_file(
    endpoint: &AcrolinxEndpoint,
    access_token: &str,
    args: &CheckArgs,
) -> Result<CheckResult> {
    let content = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let batch_id = args
        .batch_id
        .clone()
        .unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4().as_simple()));
    let request = CheckRequest::new(content)
        .with_options(CheckOptions {
            guidance_profile_id: args.guidance_profile_id.clone(),
            content_format: args.content_format.clone(),
            report_types: Some(vec![ReportType::Scorecard]),
            batch_id: Some(batch_id),
            ..CheckOptions::default()
        })
        .with_document(DocumentDescriptorRequest::with_reference(
            args.file.display().to_string(),
        ));

    let cancellation = CancellationToken::new();
    let on_ctrl_c = cancellation.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling check");
            on_ctrl_c.cancel();
        }
    });

    let mut options = CheckAndGetResultOptions::default()
        .with_cancellation(cancellation)
        .on_progress(|progress| {
            info!(percent = progress.percent, message = %progress.message, "checking");
        });
    options.timeout = args.timeout;

    let result = endpoint
        .check_and_get_result(access_token, &request, options)
        .await;
    watcher.abort();
    Ok(result?)
}

fn access_token(endpoint: &AcrolinxEndpoint) -> Result<String> {
    endpoint
        .config()
        .access_token
        .as_ref()
        .filter(|t| !t.is_blank())
        .map(|t| t.expose().clone())
        .context("no access token: set ACROLINX_ACCESS_TOKEN or access_token_file")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CheckSummary {
    pub id: String,
    pub score: f64,
    pub status: String,
    pub issues: usize,
    pub batch_id: Option<String>,
    pub scorecard: Option<String>,
}

impl From<&CheckResult> for CheckSummary {
    fn from(result: &CheckResult) -> Self {
        Self {
            id: result.id.clone(),
            score: result.quality.score,
            status: serde_json::to_value(result.quality.status)
                .ok()
                .and_then(|v| v.as_str().map(str::to_owned))
                .unwrap_or_default(),
            issues: result.issues.len(),
            batch_id: result.check_options.batch_id.clone(),
            scorecard: result
                .report(ReportType::Scorecard)
                .map(|r| r.link_authenticated.clone()),
        }
    }
}
