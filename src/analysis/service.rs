//! Remote structured-completion collaborator
//!
//! The analysis core only needs "send these messages, get back one object
//! matching this schema". [`CompletionService`] is that contract;
//! [`OpenAiCompletionService`] fulfils it against any OpenAI-compatible
//! chat-completions endpoint by forcing a single function call.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::schema::OutputSchema;
use super::task::AnalysisKind;
use crate::config::CompletionConfig;
use crate::error::{ButterflyError, Result};
use crate::utils::retry::{with_retry, RetryPolicy};

/// One structured-completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Task the call is made for
    pub kind: AnalysisKind,
    /// System instruction
    pub system: String,
    /// User content
    pub user: String,
    /// Object the service must return
    pub schema: OutputSchema,
}

/// A service that turns a prompt and a schema into one structured object
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the raw object produced for `request`. Validation against the
    /// schema is the caller's job.
    async fn complete(&self, request: &CompletionRequest) -> Result<Value>;
}

/// Chat-completions client that forces the model to call the task's
/// reporting function
pub struct OpenAiCompletionService {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

impl OpenAiCompletionService {
    /// Create a client from configuration
    pub fn new(config: &CompletionConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ButterflyError::Config("completion API key is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("butterfly/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            retry: config.retry_policy(),
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "tools": [request.schema.to_tool()],
            "tool_choice": {
                "type": "function",
                "function": { "name": request.schema.function_name },
            },
        })
    }

    async fn send_once(&self, request: &CompletionRequest, body: &Value) -> Result<Value> {
        let kind = request.kind;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ButterflyError::RateLimitExceeded(format!(
                "completion endpoint throttled the {} request",
                kind
            )));
        }
        if status.is_server_error() {
            return Err(ButterflyError::Network(format!(
                "completion endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ButterflyError::service(kind, format!("HTTP {}: {}", status, text)));
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| ButterflyError::service(kind, format!("malformed response: {}", e)))?;

        let call = envelope
            .choices
            .into_iter()
            .filter_map(|c| c.message.tool_calls)
            .flatten()
            .find(|c| c.function.name == request.schema.function_name)
            .ok_or_else(|| {
                ButterflyError::service(
                    kind,
                    format!("model did not call `{}`", request.schema.function_name),
                )
            })?;

        serde_json::from_str(&call.function.arguments)
            .map_err(|e| ButterflyError::service(kind, format!("malformed function arguments: {}", e)))
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let body = self.request_body(request);
        debug!(
            "Requesting {} analysis from {} ({} bytes of user content)",
            request.kind,
            self.endpoint,
            request.user.len()
        );

        let label = format!("{} completion", request.kind);
        with_retry(self.retry, &label, ButterflyError::is_transient, || {
            self.send_once(request, &body)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisTask;

    fn config(base_url: &str) -> CompletionConfig {
        CompletionConfig {
            base_url: base_url.to_string(),
            backoff_millis: 1,
            ..CompletionConfig::default()
        }
    }

    fn request(kind: AnalysisKind) -> CompletionRequest {
        let task = AnalysisTask::builtin(kind);
        CompletionRequest {
            kind,
            system: task.system_prompt.clone(),
            user: "Analyze this".into(),
            schema: task.schema,
        }
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(matches!(
            OpenAiCompletionService::new(&CompletionConfig::default(), "  "),
            Err(ButterflyError::Config(_))
        ));
    }

    #[test]
    fn test_request_body_forces_reporting_function() {
        let service = OpenAiCompletionService::new(&config("http://localhost/v1/"), "sk-test").unwrap();
        let body = service.request_body(&request(AnalysisKind::Performance));

        assert_eq!(service.endpoint, "http://localhost/v1/chat/completions");
        assert_eq!(body["model"], json!("gpt-4o-mini"));
        assert_eq!(body["messages"][1]["content"], json!("Analyze this"));
        assert_eq!(
            body["tool_choice"]["function"]["name"],
            json!("report_performance_security_analysis")
        );
        assert_eq!(
            body["tools"][0]["function"]["parameters"]["required"],
            json!(["overallPerformanceSecurityRisk", "keyRecommendations"])
        );
    }
}
