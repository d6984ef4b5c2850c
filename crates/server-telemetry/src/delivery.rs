// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch delivery to the ingest API.
//!
//! ```text
//!   Batch ──serialize──> POST {url}/v1/datasets/{dataset}/ingest
//!                             │
//!           2xx ──────────────┼──> Delivered
//!           4xx ──────────────┼──> Rejected (permanent, no retry)
//!           5xx / network ────┴──> backoff, next attempt ──> Exhausted
//! ```
//!
//! A failed batch is dropped, never re-queued.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, error, warn};

use crate::config::TelemetryConfig;
use crate::error::DeliveryError;
use crate::event::NormalizedEvent;
use crate::FLUSH_RETRY_COUNT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Number of attempts, no delay between them.
    Immediate(usize),
    /// Number of attempts and a base delay in milliseconds. Attempt `n`
    /// (zero-based) waits `n * delay` first.
    LinearBackoff(usize, u64),
}

impl Default for RetryStrategy {
    /// Attempts after 0s, 1s and 2s.
    fn default() -> Self {
        Self::LinearBackoff(FLUSH_RETRY_COUNT, 1000)
    }
}

impl RetryStrategy {
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::Immediate(attempts) | Self::LinearBackoff(attempts, _) => (*attempts).max(1),
        }
    }

    #[must_use]
    pub fn delay_before(&self, attempt: usize) -> Duration {
        match self {
            Self::Immediate(_) => Duration::ZERO,
            Self::LinearBackoff(_, delay_ms) => {
                Duration::from_millis(delay_ms.saturating_mul(attempt as u64))
            }
        }
    }
}

/// A batch that reached the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub attempts: usize,
    pub events: usize,
}

#[async_trait]
pub trait Deliver: Send + Sync {
    /// Delivers `batch` in full or not at all.
    async fn deliver(&self, batch: &[NormalizedEvent]) -> Result<Delivered, DeliveryError>;
}

/// [`Deliver`] implementation for the ingest HTTP API.
#[derive(Debug, Clone)]
pub struct IngestClient {
    client: reqwest::Client,
    url: String,
    api_token: String,
    retry_strategy: RetryStrategy,
}

impl IngestClient {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        url: String,
        api_token: String,
        retry_strategy: RetryStrategy,
    ) -> Self {
        Self {
            client,
            url,
            api_token,
            retry_strategy,
        }
    }

    #[must_use]
    pub fn from_config(client: reqwest::Client, config: &TelemetryConfig) -> Self {
        Self::new(
            client,
            config.ingest_url(),
            config.api_token.trim().to_string(),
            RetryStrategy::default(),
        )
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn create_request(&self, body: Vec<u8>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .bearer_auth(&self.api_token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
    }

    async fn send(&self, body: Vec<u8>, events: usize) -> Result<Delivered, DeliveryError> {
        let attempts = self.retry_strategy.attempts();

        for attempt in 0..attempts {
            let delay = self.retry_strategy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let resp = match self.create_request(body.clone()).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        "TELEMETRY | Network error during ingest (attempt {}/{attempts}): {e}",
                        attempt + 1
                    );
                    continue;
                }
            };

            let status = resp.status();
            if status.is_success() {
                debug!("TELEMETRY | Ingested {events} events");
                return Ok(Delivered {
                    attempts: attempt + 1,
                    events,
                });
            }

            if status.is_client_error() {
                // Don't retry: the same request will be rejected again.
                error!(
                    "TELEMETRY | {status}: Permanent ingest failure, not retrying: {:?}",
                    resp.text().await.unwrap_or_default()
                );
                return Err(DeliveryError::Rejected { status, events });
            }

            warn!(
                "TELEMETRY | {status}: Server error during ingest (attempt {}/{attempts}), retrying",
                attempt + 1
            );
        }

        Err(DeliveryError::Exhausted { attempts, events })
    }
}

#[async_trait]
impl Deliver for IngestClient {
    async fn deliver(&self, batch: &[NormalizedEvent]) -> Result<Delivered, DeliveryError> {
        let body = serde_json::to_vec(batch)?;
        self.send(body, batch.len()).await
    }
}
