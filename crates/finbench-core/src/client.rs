//! HTTP client for OpenAI-compatible chat-completion endpoints.
//!
//! Every call runs a bounded attempt loop driven by the [`RetryPolicy`] and
//! ends either in a [`CanonicalResponse`] or in a [`CallFailed`] the caller
//! can record per item. Nothing here panics or aborts a batch.

use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info, warn};

use crate::error::{CallFailed, InferenceError, InferenceResult};
use crate::normalize::{normalize, StreamAccumulator};
use crate::payload::{GenerationOptions, RequestPayload, WireRequest};
use crate::retry::{RetryDecision, RetryPolicy, RetryState};
use crate::trace::{record_call, CallTrace};
use finbench_types::CanonicalResponse;

const USER_AGENT_VALUE: &str = concat!("finbench/", env!("CARGO_PKG_VERSION"));
const CHAT_COMPLETIONS: &str = "/chat/completions";
const ERROR_BODY_LIMIT: usize = 512;

/// Static configuration, fixed once the client is built.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL (`http://host/v1`) or the full `/chat/completions` URL.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Defaults for payloads built through [`InferenceClient::payload`].
    pub options: GenerationOptions,
    pub connect_timeout: Duration,
    /// Upper bound for one attempt once connected, body included.
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: "EMPTY".to_string(),
            model: model.into(),
            options: GenerationOptions::default(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Per-call overrides on top of the payload and client configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOverrides {
    pub timeout: Option<Duration>,
    pub stream: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    url: String,
    config: ClientConfig,
}

impl InferenceClient {
    pub fn new(config: ClientConfig) -> InferenceResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| InferenceError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: chat_completions_url(&config.api_url),
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A payload for this client's model with its default options.
    pub fn payload(&self, system: Option<&str>, user: impl Into<String>) -> RequestPayload {
        RequestPayload::chat(&self.config.model, system, user).with_options(self.config.options.clone())
    }

    pub async fn call(&self, payload: &RequestPayload) -> Result<CanonicalResponse, CallFailed> {
        self.call_with(payload, CallOverrides::default()).await
    }

    pub async fn call_with(
        &self,
        payload: &RequestPayload,
        overrides: CallOverrides,
    ) -> Result<CanonicalResponse, CallFailed> {
        let timer = CallTrace::begin(&payload.model);

        if let Err(err) = payload.validate() {
            warn!(model = %payload.model, error = %err, "refusing to send invalid payload");
            record_call(timer.failed(0, err.to_string()));
            return Err(CallFailed {
                attempts: 0,
                last_error: err,
                history: Vec::new(),
            });
        }

        let stream = overrides.stream.unwrap_or(payload.options.stream);
        let timeout = overrides.timeout.unwrap_or(self.config.read_timeout);
        let body = payload.wire_body(stream);
        let policy = &self.config.retry;
        let mut state = RetryState::new(policy);

        loop {
            let attempt = state.attempts_made();
            debug!(model = %payload.model, attempt, stream, "sending inference request");

            match self.attempt_once(&body, stream, timeout).await {
                Ok(response) => {
                    info!(model = %payload.model, attempt, chars = response.content.len(), "inference call succeeded");
                    record_call(timer.succeeded(attempt, response.token_usage()));
                    return Ok(response);
                }
                Err(err) => {
                    let message = err.to_string();
                    match state.record_failure(err) {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(
                                model = %payload.model,
                                error = %message,
                                attempt,
                                max_attempts = policy.max_attempts,
                                backoff_ms = delay.as_millis() as u64,
                                "inference attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            let failed = state.into_failure();
                            warn!(
                                model = %payload.model,
                                attempts = failed.attempts,
                                history = ?failed.history.iter().map(|r| r.error.to_string()).collect::<Vec<_>>(),
                                "inference call gave up"
                            );
                            record_call(timer.failed(failed.attempts, message));
                            return Err(failed);
                        }
                    }
                }
            }
        }
    }

    /// Runs many payloads concurrently; results come back in input order.
    pub async fn predict(
        &self,
        payloads: Vec<RequestPayload>,
        concurrency: usize,
    ) -> Vec<Result<CanonicalResponse, CallFailed>> {
        stream::iter(payloads)
            .map(|payload| async move { self.call(&payload).await })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn attempt_once(
        &self,
        body: &WireRequest<'_>,
        stream: bool,
        timeout: Duration,
    ) -> InferenceResult<CanonicalResponse> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(InferenceError::HttpStatus {
                status: status.as_u16(),
                body: clip(text, ERROR_BODY_LIMIT),
            });
        }

        if !stream {
            let text = response.text().await?;
            return normalize(&text, false);
        }

        let mut acc = StreamAccumulator::new();
        let mut raw = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if !acc.saw_data() {
                raw.extend_from_slice(&chunk);
            }
            acc.push_chunk(&chunk);
            if acc.is_done() {
                break;
            }
        }

        if !acc.saw_data() && !acc.is_done() {
            return normalize(&String::from_utf8_lossy(&raw), true);
        }
        Ok(acc.finish())
    }
}

/// Accepts either a base URL or the full chat-completions URL.
pub fn chat_completions_url(api_url: &str) -> String {
    let trimmed = api_url.trim().trim_end_matches('/');
    let base = trimmed.strip_suffix(CHAT_COMPLETIONS).unwrap_or(trimmed);
    format!("{base}{CHAT_COMPLETIONS}")
}

fn clip(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_normalization() {
        assert_eq!(
            chat_completions_url("http://localhost:3000/v1/chat/completions"),
            "http://localhost:3000/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://localhost:3000/v1/"),
            "http://localhost:3000/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.example.com/v1/chat/completions/"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn clip_respects_char_boundaries() {
        let clipped = clip("错误错误错误".to_string(), 4);
        assert_eq!(clipped, "错…");
    }

    #[test]
    fn payload_uses_client_defaults() {
        let options = GenerationOptions {
            max_tokens: Some(4096),
            ..GenerationOptions::default()
        };
        let client = InferenceClient::new(
            ClientConfig::new("http://localhost:3000/v1", "glm-4-flash").with_options(options),
        )
        .unwrap();
        let payload = client.payload(Some("sys"), "q");
        assert_eq!(payload.model, "glm-4-flash");
        assert_eq!(payload.options.max_tokens, Some(4096));
        assert_eq!(payload.system(), Some("sys"));
    }
}
