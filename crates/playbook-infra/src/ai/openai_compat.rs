//! OpenAiCompatAnalyst -- [`AiAnalyst`] backed by an OpenAI-compatible
//! `/chat/completions` endpoint.
//!
//! The model is asked for a JSON object with a confidence score, a short
//! list of recommendations and a risk tier. Rate limits, server errors and
//! network failures are reported as transient so the engine's retry policy
//! applies; anything else is permanent.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use futures_util::future::BoxFuture;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use playbook_core::playbook::capability::{
    AiAnalyst, AnalysisReport, AnalysisRequest, CapabilityError,
};
use playbook_types::config::AiConfig;
use playbook_types::execution::RiskTier;

use crate::transport::{classify_send_error, classify_status};

const SYSTEM_PROMPT: &str = "You are an operations analyst reviewing one step of an \
incident-response playbook. Reply with a JSON object only, with keys \
\"confidence_score\" (integer 0-100), \"recommendations\" (array of at most five short \
strings) and \"risk_assessment\" (one of \"minimal\", \"low\", \"medium\", \"high\").";

/// Analyst calling an OpenAI-compatible chat completion API.
pub struct OpenAiCompatAnalyst {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiCompatAnalyst {
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Build an analyst when the key variable named in `config` is set.
    ///
    /// Returns `Ok(None)` when the variable is unset or empty.
    pub fn from_env(config: &AiConfig) -> Result<Option<Self>, reqwest::Error> {
        let key = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => key,
            _ => return Ok(None),
        };
        Self::new(
            SecretString::from(key),
            config.base_url.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn request_analysis(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisReport, CapabilityError> {
        let body = build_request_body(&self.model, request);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| CapabilityError::Transient(format!("failed to read response: {e}")))?;
        parse_completion(&text)
    }
}

impl AiAnalyst for OpenAiCompatAnalyst {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<AnalysisReport, CapabilityError>> {
        Box::pin(self.request_analysis(request))
    }
}

impl std::fmt::Debug for OpenAiCompatAnalyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAnalyst")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

fn build_request_body(model: &str, request: &AnalysisRequest) -> serde_json::Value {
    let user_prompt = json!({
        "workflow_id": request.workflow_id,
        "step_id": request.step_id,
        "action": request.action,
        "title": request.title,
        "description": request.description,
        "priority": request.priority,
        "context": request.context.as_ref(),
    });
    json!({
        "model": model,
        "temperature": 0.2,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": user_prompt.to_string() },
        ],
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    confidence_score: f64,
    #[serde(default)]
    recommendations: Vec<String>,
    risk_assessment: String,
}

fn parse_risk(value: &str) -> Result<RiskTier, CapabilityError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "minimal" => Ok(RiskTier::Minimal),
        "low" => Ok(RiskTier::Low),
        "medium" => Ok(RiskTier::Medium),
        "high" => Ok(RiskTier::High),
        other => Err(CapabilityError::Failed(format!(
            "unrecognised risk tier: {other:?}"
        ))),
    }
}

/// Extract an [`AnalysisReport`] from a chat completion response body.
fn parse_completion(body: &str) -> Result<AnalysisReport, CapabilityError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| CapabilityError::Failed(format!("malformed completion response: {e}")))?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CapabilityError::Failed("completion has no content".to_string()))?;

    let content = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let payload: AnalysisPayload = serde_json::from_str(content)
        .map_err(|e| CapabilityError::Failed(format!("malformed analysis payload: {e}")))?;

    Ok(AnalysisReport {
        confidence_score: payload.confidence_score.round() as i64,
        recommendations: payload.recommendations,
        risk: parse_risk(&payload.risk_assessment)?,
    })
}
