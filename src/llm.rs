//! Resilient invocation layer for the generative-text service.
//!
//! One [`LlmClient`] is shared by every job in the process. It owns the
//! retry/backoff policy, the per-attempt wall-clock timeout, the ceiling on
//! concurrent outbound calls, and the usage counters. The wire protocol
//! lives behind [`ChatTransport`] so the pipeline can run against a scripted
//! transport in tests.
//!
//! Retry policy: communication failures (including timeouts) are retried
//! with exponential backoff; a reply that arrives but fails extraction is
//! surfaced as [`LlmError::MalformedResponse`] without a retry, so a
//! deterministic parse bug is never re-billed.

pub mod extract;

pub use extract::{extract_structured, ExpectedShape};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::Settings;
use crate::error::LlmError;

/// Backoff after the first failed attempt; doubles per retry.
const BASE_BACKOFF: Duration = Duration::from_secs(2);
/// Ceiling on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Raw reply from one transport call.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    /// Total tokens billed for the call, when the service reports them.
    pub total_tokens: u64,
}

/// The wire seam to the generative-text service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f64) -> Result<ChatReply, LlmError>;
}

/// HTTP transport speaking the OpenAI-compatible chat-completions protocol.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpTransport {
    pub fn new(settings: &Settings) -> HttpTransport {
        HttpTransport {
            http: reqwest::Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, prompt: &str, temperature: f64) -> Result<ChatReply, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": self.max_tokens,
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Communication(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Communication(format!(
                "status {status}: {}",
                crate::util::truncate_string(&detail, 200)
            )));
        }
        let envelope: CompletionEnvelope = response
            .json()
            .await
            .map_err(|err| LlmError::Communication(format!("decode response body: {err}")))?;
        let text = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                LlmError::Communication("response carried no message content".to_string())
            })?;
        let total_tokens = envelope.usage.map(|usage| usage.total_tokens).unwrap_or(0);
        Ok(ChatReply { text, total_tokens })
    }
}

/// Point-in-time view of the shared usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub total_tokens: u64,
    pub calls: u64,
}

/// Retrying client over a [`ChatTransport`].
pub struct LlmClient {
    transport: Arc<dyn ChatTransport>,
    limiter: Semaphore,
    attempt_timeout: Duration,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    pub default_temperature: f64,
    total_tokens: AtomicU64,
    calls: AtomicU64,
}

impl LlmClient {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: &Settings) -> LlmClient {
        LlmClient {
            transport,
            limiter: Semaphore::new(settings.concurrency),
            attempt_timeout: settings.timeout,
            max_retries: settings.max_retries,
            base_backoff: BASE_BACKOFF,
            max_backoff: MAX_BACKOFF,
            default_temperature: settings.temperature,
            total_tokens: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    pub fn over_http(settings: &Settings) -> LlmClient {
        LlmClient::new(Arc::new(HttpTransport::new(settings)), settings)
    }

    /// Shrink the backoff schedule; only tests have a reason to.
    #[doc(hidden)]
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> LlmClient {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    /// One structured invocation: complete with retries, then extract the
    /// expected shape from the reply text.
    pub async fn invoke(
        &self,
        prompt: &str,
        shape: ExpectedShape,
        temperature: f64,
    ) -> Result<Value, LlmError> {
        let text = self.complete_with_retry(prompt, temperature).await?;
        extract_structured(&text, shape)
    }

    /// Prose invocation for summary text; no extraction.
    pub async fn invoke_text(&self, prompt: &str, temperature: f64) -> Result<String, LlmError> {
        self.complete_with_retry(prompt, temperature).await
    }

    pub fn usage(&self) -> UsageSnapshot {
        UsageSnapshot {
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
        }
    }

    async fn complete_with_retry(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<String, LlmError> {
        let mut attempt: u32 = 0;
        loop {
            match self.complete_once(prompt, temperature).await {
                Ok(reply) => {
                    self.calls.fetch_add(1, Ordering::Relaxed);
                    self.total_tokens
                        .fetch_add(reply.total_tokens, Ordering::Relaxed);
                    return Ok(reply.text);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "generative call failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn complete_once(&self, prompt: &str, temperature: f64) -> Result<ChatReply, LlmError> {
        // Permit is held for the attempt only, so backoff sleeps do not
        // count against the concurrency ceiling.
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| LlmError::Communication("client shut down".to_string()))?;
        match timeout(self.attempt_timeout, self.transport.complete(prompt, temperature)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Communication(format!(
                "attempt timed out after {:?}",
                self.attempt_timeout
            ))),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
