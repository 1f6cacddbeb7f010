//! Anthropic Messages API client.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::ports::{LlmClient, LlmRequest, LlmResponse};

use super::error::LlmApiError;
use super::retry::RetryPolicy;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct AnthropicClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl AnthropicClientConfig {
    /// Read the API key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> BuildResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| BuildError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;
        Ok(Self {
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            timeout_secs: 120,
            max_retries: 3,
        })
    }
}

/// JSON-message request/response client for the Messages API.
pub struct AnthropicClient {
    config: AnthropicClientConfig,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(config: AnthropicClientConfig) -> BuildResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BuildError::LlmApi(format!("failed to build HTTP client: {e}")))?;
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        };
        Ok(Self { config, http, retry })
    }

    async fn send_once(&self, request: &LlmRequest) -> Result<LlmResponse, LlmApiError> {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let response = self
            .http
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("content-type", "application/json")
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmApiError::from_status(status, body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmApiError::MalformedResponse(e.to_string()))?;

        let text = payload["content"]
            .as_array()
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|b| {
                        (b["type"].as_str() == Some("text"))
                            .then(|| b["text"].as_str().unwrap_or_default())
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmApiError::MalformedResponse(
                "response contained no text content".to_string(),
            ));
        }

        let input_tokens = payload["usage"]["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = payload["usage"]["output_tokens"].as_u64().unwrap_or(0);
        debug!(input_tokens, output_tokens, "LLM response received");

        Ok(LlmResponse {
            text,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: LlmRequest) -> BuildResult<LlmResponse> {
        self.retry
            .execute(|| self.send_once(&request))
            .await
            .map_err(|e| BuildError::LlmApi(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: String) -> AnthropicClient {
        AnthropicClient::new(AnthropicClientConfig {
            api_key: "test-key".to_string(),
            base_url,
            timeout_secs: 5,
            max_retries: 1,
        })
        .unwrap()
    }

    fn request() -> LlmRequest {
        LlmRequest {
            model: "claude-haiku-4-5".to_string(),
            system: None,
            prompt: "hello".to_string(),
            max_tokens: 64,
            temperature: 0.2,
        }
    }

    #[tokio::test]
    async fn test_complete_parses_text_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "content": [{"type": "text", "text": "hi there"}],
                    "usage": {"input_tokens": 12, "output_tokens": 5},
                })
                .to_string(),
            )
            .create_async()
            .await;

        let response = client(server.url()).complete(request()).await.unwrap();
        assert_eq!(response.text, "hi there");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(400)
            .with_body("bad request")
            .expect(1)
            .create_async()
            .await;

        let err = client(server.url()).complete(request()).await.unwrap_err();
        assert!(matches!(err, BuildError::LlmApi(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .with_status(503)
            .with_body("overloaded")
            .expect(2)
            .create_async()
            .await;

        let mut c = client(server.url());
        c.retry = RetryPolicy::new(1, 1, 10);
        let err = c.complete(request()).await.unwrap_err();
        assert!(matches!(err, BuildError::LlmApi(_)));
        // Two hits prove the transient error was retried once.
        mock.assert_async().await;
    }
}
