//! Chat-completion API access.
//!
//! - [`ChatCompletion`]: the one operation every stage needs from an LLM
//! - [`AzureOpenAiClient`]: Azure OpenAI REST implementation
//! - [`RetryChat`]: decorator retrying throttled calls with exponential backoff
//!
//! Retrying is opt-in (`llm_max_retries`, default `0`) and only ever applies to
//! [`LlmError::Throttled`]; every other failure is returned on the first attempt.

use crate::config::PipelineSettings;
use crate::error::LlmError;
use crate::secrets::LlmSecrets;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// A single chat-completion request: system instruction plus user prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(system: &str, user: String, temperature: f32) -> Self {
        ChatRequest {
            temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        }
    }

    pub fn user_prompt(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Anything that can turn a [`ChatRequest`] into completion text.
pub trait ChatCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Azure OpenAI chat-completions client for one deployment.
pub struct AzureOpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    deployment: String,
    model: String,
    api_key: String,
    api_version: String,
}

impl fmt::Debug for AzureOpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiClient")
            .field("endpoint", &self.endpoint)
            .field("deployment", &self.deployment)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl AzureOpenAiClient {
    pub fn new(secrets: &LlmSecrets, settings: &PipelineSettings) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder().user_agent(settings.user_agent.clone());
        if let Some(secs) = settings.llm_timeout_secs {
            builder = builder.timeout(StdDuration::from_secs(secs));
        }
        Ok(AzureOpenAiClient {
            http: builder.build()?,
            endpoint: secrets.endpoint.trim_end_matches('/').to_string(),
            deployment: secrets.deployment.clone(),
            model: secrets.model.clone().unwrap_or_else(|| secrets.deployment.clone()),
            api_key: secrets.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint,
            urlencoding::encode(&self.deployment),
            urlencoding::encode(&self.api_version)
        )
    }
}

impl ChatCompletion for AzureOpenAiClient {
    #[instrument(level = "info", skip_all, fields(deployment = %self.deployment))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let t0 = Instant::now();
        let body = CompletionBody {
            model: &self.model,
            temperature: request.temperature,
            messages: &request.messages,
        };

        let response = self
            .http
            .post(self.completions_url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            warn!(?retry_after_secs, "Endpoint throttled the request");
            return Err(LlmError::Throttled { retry_after_secs });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&text, 500),
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)?;

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            prompt_chars = request.user_prompt().len(),
            bytes = content.len(),
            "Completion received"
        );
        Ok(content)
    }
}

/// Wrapper that retries throttled calls of any [`ChatCompletion`].
///
/// The delay between retries follows:
/// ```text
/// delay = retry_after | min(base_delay * 2^(attempt-1), max_delay) + random_jitter
/// ```
pub struct RetryChat<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
    max_jitter: StdDuration,
}

impl<T> RetryChat<T>
where
    T: ChatCompletion,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter: StdDuration::from_millis(250),
        }
    }

    #[cfg(test)]
    pub fn with_max_jitter(mut self, max_jitter: StdDuration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    fn backoff(&self, attempt: usize, retry_after_secs: Option<u64>) -> StdDuration {
        let delay = match retry_after_secs {
            Some(secs) => StdDuration::from_secs(secs),
            None => self.base_delay.saturating_mul(1 << (attempt - 1).min(16)),
        }
        .min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.max_jitter.as_millis() as u64);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryChat<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryChat")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> ChatCompletion for RetryChat<T>
where
    T: ChatCompletion,
{
    #[instrument(level = "info", skip_all)]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(LlmError::Throttled { retry_after_secs }) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt, retry_after_secs);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        ?delay,
                        "Throttled; backing off"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if attempt > 0 {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "complete() gave up"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

/// Build the production client stack from resolved secrets and settings.
pub fn build_client(
    secrets: &LlmSecrets,
    settings: &PipelineSettings,
) -> Result<RetryChat<AzureOpenAiClient>, LlmError> {
    let client = AzureOpenAiClient::new(secrets, settings)?;
    debug!(?client, "Built chat client");
    Ok(RetryChat::new(
        client,
        settings.llm_max_retries,
        StdDuration::from_millis(settings.llm_retry_base_delay_ms),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedChat, spawn_stub};
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn secrets(endpoint: &str) -> LlmSecrets {
        LlmSecrets {
            api_key: "test-key".into(),
            endpoint: endpoint.into(),
            deployment: "news-gpt".into(),
            model: Some("gpt-4o".into()),
        }
    }

    #[test]
    fn test_chat_request_layout() {
        let req = ChatRequest::new("Respond in JSON", "Analyze this".into(), 0.3);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].role, "user");
        assert_eq!(req.user_prompt(), "Analyze this");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let client = AzureOpenAiClient::new(&secrets("https://x.openai.azure.com/"), &PipelineSettings::default()).unwrap();
        let dbg = format!("{client:?}");
        assert!(dbg.contains("<redacted>"));
        assert!(!dbg.contains("test-key"));
        assert_eq!(
            client.completions_url(),
            "https://x.openai.azure.com/openai/deployments/news-gpt/chat/completions?api-version=2024-02-01"
        );
    }

    #[tokio::test]
    async fn test_azure_client_posts_chat_request() {
        async fn handler(
            headers: HeaderMap,
            Query(q): Query<HashMap<String, String>>,
            Json(body): Json<serde_json::Value>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            assert_eq!(headers.get("api-key").unwrap(), "test-key");
            assert_eq!(q.get("api-version").map(String::as_str), Some("2024-02-01"));
            assert_eq!(body["model"], "gpt-4o");
            assert_eq!(body["messages"][0]["role"], "system");
            let temperature = body["temperature"].as_f64().unwrap();
            assert!((temperature - 0.3).abs() < 1e-6);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}]
                })),
            )
        }

        let base = spawn_stub(Router::new().route("/openai/deployments/news-gpt/chat/completions", post(handler))).await;
        let client = AzureOpenAiClient::new(&secrets(&base), &PipelineSettings::default()).unwrap();
        let out = client
            .complete(&ChatRequest::new("sys", "user".into(), 0.3))
            .await
            .unwrap();
        assert_eq!(out, "{\"ok\": true}");
    }

    #[tokio::test]
    async fn test_azure_client_maps_throttling_and_errors() {
        let router = Router::new()
            .route(
                "/openai/deployments/news-gpt/chat/completions",
                post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "7")], "slow down") }),
            )
            .route(
                "/openai/deployments/broken/chat/completions",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let base = spawn_stub(router).await;

        let client = AzureOpenAiClient::new(&secrets(&base), &PipelineSettings::default()).unwrap();
        let err = client.complete(&ChatRequest::new("s", "u".into(), 0.2)).await.unwrap_err();
        assert!(matches!(err, LlmError::Throttled { retry_after_secs: Some(7) }));

        let mut broken = secrets(&base);
        broken.deployment = "broken".into();
        let client = AzureOpenAiClient::new(&broken, &PipelineSettings::default()).unwrap();
        let err = client.complete(&ChatRequest::new("s", "u".into(), 0.2)).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_retry_only_on_throttling() {
        let stub = ScriptedChat::new(vec![
            Err(LlmError::Throttled { retry_after_secs: None }),
            Err(LlmError::Throttled { retry_after_secs: None }),
            Ok("done".into()),
        ]);
        let retry = RetryChat::new(stub, 3, StdDuration::from_millis(1)).with_max_jitter(StdDuration::ZERO);
        let out = retry.complete(&ChatRequest::new("s", "u".into(), 0.2)).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(retry.inner.calls(), 3);

        let stub = ScriptedChat::new(vec![Err(LlmError::EmptyCompletion), Ok("never".into())]);
        let retry = RetryChat::new(stub, 3, StdDuration::from_millis(1)).with_max_jitter(StdDuration::ZERO);
        assert!(retry.complete(&ChatRequest::new("s", "u".into(), 0.2)).await.is_err());
        assert_eq!(retry.inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_returns_first_throttle() {
        let stub = ScriptedChat::new(vec![Err(LlmError::Throttled { retry_after_secs: Some(1) })]);
        let retry = RetryChat::new(stub, 0, StdDuration::from_millis(1));
        let err = retry.complete(&ChatRequest::new("s", "u".into(), 0.2)).await.unwrap_err();
        assert!(matches!(err, LlmError::Throttled { .. }));
        assert_eq!(retry.inner.calls(), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryChat::new(ScriptedChat::new(vec![]), 10, StdDuration::from_secs(1))
            .with_max_jitter(StdDuration::ZERO);
        assert_eq!(retry.backoff(1, None), StdDuration::from_secs(1));
        assert_eq!(retry.backoff(3, None), StdDuration::from_secs(4));
        assert_eq!(retry.backoff(10, None), StdDuration::from_secs(30));
        assert_eq!(retry.backoff(1, Some(5)), StdDuration::from_secs(5));
    }
}
