//! LLM provider client (Anthropic-style Messages API)
//!
//! Non-streaming: the workflow runs batch calls and only needs the final
//! text plus token usage. Requests are rate limited client-side and
//! retried with exponential backoff on transient failures (network
//! errors, 429, 5xx). Other 4xx responses fail immediately.

use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Default provider endpoint; tests override with a local mock server
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Default model when no agent config overrides it
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const USER_AGENT: &str = "CTIScraper/0.1.0 (+https://github.com/cti-scraper/cti-scraper)";
const RATE_LIMIT_MS: u64 = 500;
const MAX_ATTEMPTS: u32 = 3;

/// LLM client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("LLM API key not configured")]
    NotConfigured,
}

/// Result of one completion call
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Messages API response shapes (only the fields we consume)
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Anthropic-style Messages API client
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::NotConfigured);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    /// Default model for agents without a configured override
    pub fn default_model(&self) -> &str {
        &self.model
    }

    /// Send one messages request and return the concatenated text blocks.
    ///
    /// Retries up to 3 times with exponential backoff on network errors,
    /// 429 and 5xx responses.
    pub async fn complete(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        user: &str,
    ) -> Result<Completion, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "system": system,
            "messages": [{ "role": "user", "content": user }]
        });

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));

        let mut backoff_ms = 500u64;
        let mut last_error = LlmError::Network("no attempts made".to_string());

        for attempt in 1..=MAX_ATTEMPTS {
            self.rate_limiter.wait().await;

            if attempt > 1 {
                tracing::debug!(attempt, model, "Retrying LLM request");
            }

            let response = self
                .http
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: MessagesResponse = resp
                            .json()
                            .await
                            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

                        let text: String = parsed
                            .content
                            .iter()
                            .filter(|block| block.kind == "text")
                            .map(|block| block.text.as_str())
                            .collect();

                        if text.is_empty() {
                            return Err(LlmError::MalformedResponse(
                                "response contained no text blocks".to_string(),
                            ));
                        }

                        return Ok(Completion {
                            text,
                            input_tokens: parsed.usage.input_tokens,
                            output_tokens: parsed.usage.output_tokens,
                        });
                    }

                    let code = status.as_u16();
                    let message = resp
                        .text()
                        .await
                        .ok()
                        .and_then(|text| serde_json::from_str::<ApiErrorBody>(&text).ok())
                        .and_then(|body| body.error)
                        .map(|detail| detail.message)
                        .unwrap_or_else(|| status.to_string());

                    let retryable = code == 429 || code >= 500;
                    if !retryable {
                        return Err(LlmError::Api(code, message));
                    }

                    tracing::warn!(attempt, code, "LLM request failed, will retry: {}", message);
                    last_error = LlmError::Api(code, message);
                }
                Err(e) => {
                    tracing::warn!(attempt, "LLM network error, will retry: {}", e);
                    last_error = LlmError::Network(e.to_string());
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        )
    }

    async fn serve_once(listener: TcpListener, response: String) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
    }

    #[test]
    fn empty_api_key_is_not_configured() {
        let result = LlmClient::new(String::new(), DEFAULT_MODEL.to_string(), DEFAULT_BASE_URL.to_string());
        assert!(matches!(result, Err(LlmError::NotConfigured)));
    }

    #[tokio::test]
    async fn complete_parses_text_and_usage() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "{\"score\": "},
                {"type": "text", "text": "0.9}"}
            ],
            "model": "claude-sonnet-4-5",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 120, "output_tokens": 8}
        }"#;
        let response = http_response("200 OK", body);
        let server = tokio::spawn(serve_once(listener, response));

        let client = LlmClient::new(
            "test-key".to_string(),
            DEFAULT_MODEL.to_string(),
            format!("http://{}", addr),
        )
        .unwrap();

        let completion = client
            .complete(DEFAULT_MODEL, 256, "system", "user content")
            .await
            .unwrap();

        assert_eq!(completion.text, "{\"score\": 0.9}");
        assert_eq!(completion.input_tokens, 120);
        assert_eq!(completion.output_tokens, 8);

        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = r#"{"error": {"message": "Invalid API key", "type": "authentication_error"}}"#;
        let response = http_response("401 Unauthorized", body);
        let server = tokio::spawn(serve_once(listener, response));

        let client = LlmClient::new(
            "bad-key".to_string(),
            DEFAULT_MODEL.to_string(),
            format!("http://{}", addr),
        )
        .unwrap();

        let err = client
            .complete(DEFAULT_MODEL, 256, "system", "user")
            .await
            .unwrap_err();

        match err {
            LlmError::Api(401, message) => assert!(message.contains("Invalid API key")),
            other => panic!("Expected Api(401, _), got: {:?}", other),
        }

        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_retried_then_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let ok_body = r#"{
            "content": [{"type": "text", "text": "recovered"}],
            "usage": {"input_tokens": 10, "output_tokens": 2}
        }"#;
        let error_response = http_response("500 Internal Server Error", "{}");
        let ok_response = http_response("200 OK", ok_body);

        let server = tokio::spawn(async move {
            // First connection: 500. Second connection: 200.
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(error_response.as_bytes()).await.unwrap();
            drop(socket);

            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(ok_response.as_bytes()).await.unwrap();
        });

        let client = LlmClient::new(
            "test-key".to_string(),
            DEFAULT_MODEL.to_string(),
            format!("http://{}", addr),
        )
        .unwrap();

        let completion = client
            .complete(DEFAULT_MODEL, 256, "system", "user")
            .await
            .unwrap();

        assert_eq!(completion.text, "recovered");
        server.await.unwrap();
    }
}
