//! Text-generation API access with exponential backoff retry logic.
//!
//! - [`AskAsync`]: core trait for sending a prompt and getting a reply
//! - [`ChatCompletionsClient`]: talks to an OpenAI-compatible
//!   `/chat/completions` endpoint
//! - [`RetryAsk`]: decorator that retries transient failures of any
//!   [`AskAsync`] implementation
//!
//! # Retry Strategy
//!
//! - Only failures where [`EnrichmentError::is_retryable`] holds are retried
//! - Exponential backoff from a base delay, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::EnrichmentConfig;
use crate::error::EnrichmentError;
use rand::{Rng, rng};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes and classifies blog articles. \
Always answer with a single JSON object and nothing else.";

/// Trait for async text-generation calls.
///
/// Implementations must not share mutable state between calls, so many
/// calls can be in flight at once.
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    /// Send `text` as the user message and wait for the reply.
    ///
    /// # Arguments
    ///
    /// * `text` - The full prompt, already bounded by the caller
    ///
    /// # Returns
    ///
    /// The model's reply, or an [`EnrichmentError`] describing why there is none.
    async fn ask(&self, text: &str) -> Result<Self::Response, EnrichmentError>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryAsk<T> {
    /// The client whose transient failures are retried.
    inner: T,
    /// Retries after the first attempt before giving up.
    max_retries: usize,
    /// Delay before the first retry, doubled on each further one.
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Wrap an existing [`AskAsync`] implementation with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The client to wrap
    /// * `max_retries` - Retries after the first attempt (5 by default in config)
    /// * `base_delay` - Delay before the first retry (1 second by default)
    ///
    /// # Example
    ///
    /// ```ignore
    /// let chat = ChatCompletionsClient::new(http, &config.enrichment, api_key);
    /// let asker = RetryAsk::new(chat, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, EnrichmentError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            retryable = e.is_retryable(),
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "ask() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat completions endpoint.
///
/// Shares the connection pool of the `reqwest::Client` it is built with.
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: StdDuration,
}

impl ChatCompletionsClient {
    /// # Arguments
    ///
    /// * `client` - Shared HTTP client
    /// * `config` - Endpoint, model and request timeout
    /// * `api_key` - Bearer token; a blank key counts as none
    pub fn new(client: Client, config: &EnrichmentConfig, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            timeout: StdDuration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl AskAsync for ChatCompletionsClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, EnrichmentError> {
        let api_key = self.api_key.as_deref().ok_or(EnrichmentError::MissingApiKey)?;
        let payload = json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text }
            ]
        });

        let t0 = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), elapsed_ms = t0.elapsed().as_millis() as u64, "API call failed");
            return Err(EnrichmentError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response.json().await?;
        debug!(elapsed_ms = t0.elapsed().as_millis() as u64, "API call succeeded");
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(EnrichmentError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the given errors in order, then succeeds.
    struct Flaky {
        calls: AtomicUsize,
        failures: Vec<fn() -> EnrichmentError>,
    }

    fn timeout() -> EnrichmentError {
        EnrichmentError::Timeout
    }

    fn unavailable() -> EnrichmentError {
        EnrichmentError::HttpStatus {
            status: 503,
            body: String::new(),
        }
    }

    fn missing_key() -> EnrichmentError {
        EnrichmentError::MissingApiKey
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, _text: &str) -> Result<String, EnrichmentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.get(n) {
                Some(make) => Err(make()),
                None => Ok("ok".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failures() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![timeout as fn() -> EnrichmentError, unavailable],
        };
        let api = RetryAsk::new(flaky, 5, StdDuration::from_millis(1));
        assert_eq!(api.ask("hi").await.unwrap(), "ok");
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_permanent_failure() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![missing_key as fn() -> EnrichmentError],
        };
        let api = RetryAsk::new(flaky, 5, StdDuration::from_millis(1));
        assert!(matches!(api.ask("hi").await, Err(EnrichmentError::MissingApiKey)));
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_retries() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            failures: vec![timeout as fn() -> EnrichmentError; 10],
        };
        let api = RetryAsk::new(flaky, 2, StdDuration::from_millis(1));
        assert!(matches!(api.ask("hi").await, Err(EnrichmentError::Timeout)));
        assert_eq!(api.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let api = RetryAsk::new(
            Flaky {
                calls: AtomicUsize::new(0),
                failures: vec![],
            },
            5,
            StdDuration::from_secs(1),
        );
        assert!(api.backoff(1) < StdDuration::from_millis(1251));
        assert!(api.backoff(10) <= StdDuration::from_millis(30_250));
    }

    #[tokio::test]
    async fn test_chat_client_without_key_fails_fast() {
        let client = ChatCompletionsClient::new(
            Client::new(),
            &EnrichmentConfig::default(),
            Some("  ".to_string()),
        );
        assert!(!client.has_api_key());
        assert!(matches!(client.ask("hi").await, Err(EnrichmentError::MissingApiKey)));
    }
}
