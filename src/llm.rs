//! Text oracle: the single capability every component uses to talk to a
//! language model. `LlmClient` is the OpenAI-compatible HTTP implementation,
//! `ScriptedOracle` answers from canned rules for tests and offline runs.

use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// One prompt -> text round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    /// Hard cap on generated tokens. `None` leaves it to the provider.
    pub max_output_tokens: Option<u32>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>, model: &str) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: model.to_string(),
            max_output_tokens: Some(500),
            temperature: 0.0,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: Option<u32>) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Returns the model's text, or `OracleUnavailable` once retries are exhausted.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Error-stringifying variant: failures come back as `"Error: <detail>"` text
/// instead of an `Err`.
pub async fn complete_lossy(oracle: &dyn TextOracle, request: &CompletionRequest) -> String {
    match oracle.complete(request).await {
        Ok(text) => text,
        Err(e) => format!("Error: {}", e),
    }
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, max_retries: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
            max_retries,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        Ok(Self::new(api_key, config.base_url.clone(), config.max_retries))
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    fn request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system_prompt},
                {"role": "user", "content": request.user_prompt}
            ],
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn call_once(&self, body: &serde_json::Value) -> std::result::Result<String, CallFailure> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| CallFailure::Transient(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("LLM API error ({}): {}", status, error_text);
            return if status.as_u16() == 429 || status.is_server_error() {
                Err(CallFailure::Transient(message))
            } else {
                Err(CallFailure::Fatal(message))
            };
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallFailure::Transient(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json).map_err(CallFailure::Fatal)
    }
}

enum CallFailure {
    Transient(String),
    Fatal(String),
}

/// Pulls `choices[0].message.content` out of a chat-completions payload.
fn extract_content(response_json: &serde_json::Value) -> std::result::Result<String, String> {
    if let Some(error) = response_json.get("error") {
        return Err(format!("LLM API error: {}", error));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| "No choices array in LLM response".to_string())?;

    let first = choices
        .first()
        .ok_or_else(|| "Empty choices array in LLM response".to_string())?;

    if first.get("finish_reason").and_then(|r| r.as_str()) == Some("content_filter") {
        return Err("LLM response was filtered by content policy".to_string());
    }

    first["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| "No content in LLM response".to_string())
}

#[async_trait]
impl TextOracle for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = Self::request_body(request);
        let mut attempt = 0u32;

        loop {
            match self.call_once(&body).await {
                Ok(content) => {
                    debug!("LLM returned {} chars (model {})", content.len(), request.model);
                    return Ok(content);
                }
                Err(CallFailure::Fatal(message)) => {
                    return Err(AssistantError::OracleUnavailable(message));
                }
                Err(CallFailure::Transient(message)) => {
                    if attempt >= self.max_retries {
                        return Err(AssistantError::OracleUnavailable(format!(
                            "{} (after {} attempts)",
                            message,
                            attempt + 1
                        )));
                    }
                    attempt += 1;
                    warn!("LLM call failed, retry {}/{}: {}", attempt, self.max_retries, message);
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Fail(String),
}

/// Oracle that answers from `(pattern, reply)` rules. A rule fires when its
/// pattern occurs in the system or user prompt; the first matching rule wins.
#[derive(Default)]
pub struct ScriptedOracle {
    rules: Vec<(String, ScriptedReply)>,
    default_reply: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, pattern: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules
            .push((pattern.into(), ScriptedReply::Text(reply.into())));
        self
    }

    pub fn fail_on(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules
            .push((pattern.into(), ScriptedReply::Fail(message.into())));
        self
    }

    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = Some(reply.into());
        self
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextOracle for ScriptedOracle {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let matched = self.rules.iter().find(|(pattern, _)| {
            request.system_prompt.contains(pattern.as_str())
                || request.user_prompt.contains(pattern.as_str())
        });

        match matched {
            Some((_, ScriptedReply::Text(text))) => Ok(text.clone()),
            Some((_, ScriptedReply::Fail(message))) => {
                Err(AssistantError::OracleUnavailable(message.clone()))
            }
            None => self.default_reply.clone().ok_or_else(|| {
                AssistantError::OracleUnavailable("no scripted reply for request".to_string())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_content() {
        let payload = serde_json::json!({
            "choices": [{"message": {"content": "insight"}, "finish_reason": "stop"}]
        });
        assert_eq!(extract_content(&payload).unwrap(), "insight");

        let filtered = serde_json::json!({
            "choices": [{"message": {"content": ""}, "finish_reason": "content_filter"}]
        });
        assert!(extract_content(&filtered).is_err());

        let error = serde_json::json!({"error": {"message": "bad key"}});
        assert!(extract_content(&error).unwrap_err().contains("bad key"));
    }

    #[test]
    fn test_request_body_token_cap() {
        let request = CompletionRequest::new("sys", "user", "gpt-4o");
        let body = LlmClient::request_body(&request);
        assert_eq!(body["max_tokens"], 500);

        let uncapped = request.with_max_output_tokens(None);
        let body = LlmClient::request_body(&uncapped);
        assert!(body.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_lossy_completion_stringifies_errors() {
        let oracle = ScriptedOracle::new().fail_on("boom", "connection refused");
        let request = CompletionRequest::new("boom", "hello", "gpt-4o");
        let text = complete_lossy(&oracle, &request).await;
        assert!(text.starts_with("Error: "));
        assert!(text.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_retries() {
        let client = LlmClient::new("sk-test".to_string(), "http://127.0.0.1:9".to_string(), 1)
            .with_retry_delay(Duration::from_millis(1));
        let request = CompletionRequest::new("sys", "user", "gpt-4o");
        let err = client.complete(&request).await.unwrap_err();
        match err {
            AssistantError::OracleUnavailable(message) => assert!(message.contains("2 attempts")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
