//! Shared HTTP fetch layer.
//!
//! Every outbound REST/JSON-RPC call flows through `HttpFetcher`: rate-limit
//! acquire, circuit check, request with timeout, capped exponential backoff
//! with jitter on transient failures, and health bookkeeping on every
//! outcome. The struct owns nothing global; it is built once and shared.

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::health::ProviderHealth;
use crate::logger::{self, LogTag};
use crate::rate_limit::RateLimits;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("circuit open for provider {0}")]
    CircuitOpen(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("malformed response body")]
    Decode,
}

impl FetchError {
    /// Transient failures are retried at the call site and escalate into the
    /// circuit breaker; the rest fail fast.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(_) => true,
            FetchError::Status(status) => {
                matches!(status.as_u16(), 408 | 425 | 429 | 500..=599)
            }
            _ => false,
        }
    }
}

/// A request about to go out, with its provider identity attached.
pub struct FetchRequest<'a> {
    pub provider: &'a str,
    pub url: &'a str,
    pub headers: Vec<(&'a str, String)>,
    pub body: Option<Value>,
}

impl<'a> FetchRequest<'a> {
    pub fn get(provider: &'a str, url: &'a str) -> Self {
        Self {
            provider,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(provider: &'a str, url: &'a str, body: Value) -> Self {
        Self {
            provider,
            url,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn header(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

pub struct HttpFetcher {
    client: Client,
    health: Arc<ProviderHealth>,
    limits: Arc<RateLimits>,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(
        health: Arc<ProviderHealth>,
        limits: Arc<RateLimits>,
        timeout_secs: u64,
        retries: u32,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent("MintScout/0.1")
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            health,
            limits,
            retries,
        })
    }

    /// Fetch a JSON payload with retries, rate limiting and health gating.
    pub async fn fetch_json(&self, request: FetchRequest<'_>) -> Result<Value, FetchError> {
        if !self.health.is_available(request.provider) {
            logger::debug(
                LogTag::Http,
                &format!(
                    "Skipping {} request to {} (circuit open)",
                    request.provider, request.url
                ),
            );
            return Err(FetchError::CircuitOpen(request.provider.to_string()));
        }

        self.limits.acquire(request.provider).await;

        let mut last_error = FetchError::Decode;
        for attempt in 0..=self.retries {
            let start = Instant::now();
            match self.send_once(&request).await {
                Ok(value) => {
                    self.health
                        .record_success(request.provider, start.elapsed());
                    return Ok(value);
                }
                Err(err) => {
                    self.health
                        .record_failure(request.provider, &err.to_string());
                    let transient = err.is_transient();
                    last_error = err;
                    if !transient || attempt == self.retries {
                        break;
                    }
                    // Capped exponential backoff with jitter
                    let backoff = (0.5 * 2f64.powi(attempt as i32)).min(8.0)
                        + rand::thread_rng().gen_range(0.0..0.25);
                    logger::debug(
                        LogTag::Http,
                        &format!(
                            "{} {} failed ({}), retry {}/{} in {:.2}s",
                            request.provider,
                            request.url,
                            last_error,
                            attempt + 1,
                            self.retries,
                            backoff
                        ),
                    );
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                }
            }
        }
        Err(last_error)
    }

    async fn send_once(&self, request: &FetchRequest<'_>) -> Result<Value, FetchError> {
        let mut builder = match &request.body {
            Some(body) => self.client.post(request.url).json(body),
            None => self.client.get(request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        response.json::<Value>().await.map_err(|_| FetchError::Decode)
    }
}
