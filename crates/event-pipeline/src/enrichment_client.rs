// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::EnrichmentError;
use crate::http_utils::build_client_or_default;
use crate::record::{EnrichmentRequest, EnrichmentResponse, Record};

/// Bounded retry schedule with exponential backoff and no jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failed attempt. Doubles after every further failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[async_trait]
pub trait Enricher {
    /// Enriches one record, retrying transient failures according to the retry policy.
    /// Only returns once the record is enriched or every attempt has failed.
    async fn enrich(&self, record: Record) -> Result<Record, EnrichmentError>;
}

/// Calls the external enrichment endpoint over HTTP.
pub struct HttpEnrichmentClient {
    url: String,
    auth_token: String,
    retry_policy: RetryPolicy,
    client: reqwest::Client,
}

impl HttpEnrichmentClient {
    pub fn new(config: &Config) -> Self {
        let client =
            build_client_or_default(config.proxy_url.as_deref(), config.request_timeout());
        HttpEnrichmentClient {
            url: config.enrichment_url.clone(),
            auth_token: config.auth_token.clone(),
            retry_policy: config.enrichment_retry,
            client,
        }
    }

    async fn attempt(
        &self,
        request: &EnrichmentRequest<'_>,
    ) -> Result<EnrichmentResponse, EnrichmentError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.auth_token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EnrichmentError::Status { status, body });
        }
        serde_json::from_str(&body).map_err(EnrichmentError::Decode)
    }
}

#[async_trait]
impl Enricher for HttpEnrichmentClient {
    async fn enrich(&self, mut record: Record) -> Result<Record, EnrichmentError> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(
                "Enrichment Client | Attempt {attempts}: calling enrichment service for record {}",
                record.id
            );

            let time = Instant::now();
            let result = self.attempt(&EnrichmentRequest::from(&record)).await;
            let elapsed = time.elapsed();

            match result {
                Ok(enrichment) => {
                    debug!(
                        "Enrichment Client | Enriched record {} in {} ms",
                        record.id,
                        elapsed.as_millis()
                    );
                    record.apply_enrichment(enrichment);
                    return Ok(record);
                }
                Err(e) => {
                    warn!(
                        "Enrichment Client | Attempt {attempts} for record {} failed: {e}",
                        record.id
                    );
                    if attempts >= self.retry_policy.max_attempts {
                        error!(
                            "Enrichment Client | Giving up on record {} after {attempts} attempts",
                            record.id
                        );
                        return Err(EnrichmentError::Exhausted {
                            id: record.id,
                            attempts,
                            last: Box::new(e),
                        });
                    }
                }
            }

            // Exponential backoff
            tokio::time::sleep(self.retry_policy.backoff_after(attempts)).await;
        }
    }
}
