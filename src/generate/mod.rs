//! Reply generation with bounded retries
//!
//! [`ResponseClient::generate`] never fails: after the last failed attempt it
//! returns a fixed apology so the turn always has something to say.

mod markup;
mod provider;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

pub use markup::strip_markup;
pub use provider::{OutboundRequest, Provider};
pub use retry::{Backoff, RetryPolicy};

use crate::{Error, Result};

/// Reply used when every attempt failed
pub const FALLBACK_REPLY: &str =
    "I apologize, but I'm having trouble generating a response. Please try again.";

/// Raw HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// Status code
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Sends generation requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the request and return the raw response
    ///
    /// # Errors
    ///
    /// Returns error on connection failure or timeout
    async fn post_json(&self, request: &OutboundRequest) -> Result<TransportResponse>;
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, request: &OutboundRequest) -> Result<TransportResponse> {
        let mut builder = self.client.post(&request.url).json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.timeout)
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read body: {e}")))?;

        Ok(TransportResponse { status, body })
    }
}

/// Outcome of a generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    /// Cleaned reply, or the fallback apology
    pub text: String,
    /// Attempts made (0 when no request was sent)
    pub attempts: u32,
    /// Whether `text` came from the model
    pub success: bool,
    /// Time spent including backoff
    pub latency: Duration,
}

/// Sends transcripts to a generation provider
#[derive(Clone)]
pub struct ResponseClient {
    transport: Arc<dyn Transport>,
    provider: Provider,
    policy: RetryPolicy,
    fallback: String,
}

impl std::fmt::Debug for ResponseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseClient")
            .field("provider", &self.provider)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ResponseClient {
    /// Create a client using the HTTP transport
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(provider: Provider, policy: RetryPolicy) -> Result<Self> {
        let transport = HttpTransport::new(policy.timeout)?;
        Ok(Self::with_transport(provider, policy, Arc::new(transport)))
    }

    /// Create a client around an explicit transport
    #[must_use]
    pub fn with_transport(
        provider: Provider,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            transport,
            provider,
            policy,
            fallback: FALLBACK_REPLY.to_string(),
        }
    }

    /// Replace the fallback apology
    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Configured provider
    #[must_use]
    pub const fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Failed result carrying the fallback apology
    #[must_use]
    pub fn fallback_result(&self, attempts: u32, latency: Duration) -> GenerationResult {
        GenerationResult {
            text: self.fallback.clone(),
            attempts,
            success: false,
            latency,
        }
    }

    /// Generate a reply to `text`
    ///
    /// Retries on timeouts, transport errors, non-2xx statuses and
    /// unexpected payloads, sleeping between attempts per the policy.
    pub async fn generate(&self, text: &str) -> GenerationResult {
        let start = Instant::now();
        let request = self.provider.build_request(text);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            tracing::debug!(provider = self.provider.name(), attempt, "generating response");

            match self.attempt(&request).await {
                Ok(text) => {
                    tracing::info!(attempt, chars = text.len(), "response generated");
                    return GenerationResult {
                        text,
                        attempts: attempt,
                        success: true,
                        latency: start.elapsed(),
                    };
                }
                Err(e) => {
                    if self.policy.has_attempt_after(attempt) {
                        let delay = self.policy.delay_after(attempt);
                        tracing::warn!(
                            error = %e,
                            attempt,
                            max_attempts,
                            ?delay,
                            "generation attempt failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        tracing::error!(error = %e, attempt, "generation failed, giving up");
                    }
                }
            }
        }

        self.fallback_result(max_attempts, start.elapsed())
    }

    async fn attempt(&self, request: &OutboundRequest) -> Result<String> {
        let response = tokio::time::timeout(self.policy.timeout, self.transport.post_json(request))
            .await
            .map_err(|_| Error::Timeout(self.policy.timeout))??;

        if !(200..300).contains(&response.status) {
            return Err(Error::Network(format!(
                "{} returned status {}",
                self.provider.name(),
                response.status
            )));
        }

        let reply = self
            .provider
            .extract_reply(&response.body)
            .ok_or_else(|| Error::Network("response missing expected payload".to_string()))?;

        let text = strip_markup(&reply);
        if text.trim().is_empty() {
            return Err(Error::Network("reply is empty after markup removal".to_string()));
        }

        Ok(text)
    }
}
