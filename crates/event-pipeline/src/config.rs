// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::enrichment_client::RetryPolicy;

const DEFAULT_INTAKE_PORT: u16 = 8081;
const DEFAULT_ENRICHMENT_URL: &str = "https://api.heyering.com/enrichment";
const DEFAULT_ANALYTICS_URL: &str = "https://api.heyering.com/analytics";

/// What the dispatcher does with a batch the analytics sink refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailedBatchPolicy {
    /// Log the failure and lose the batch.
    Drop,
    /// Hold the batch and resend it on the following ticks, in place of a fresh drain, up to
    /// `max_retries` more times before dropping it.
    RetryNextTick { max_retries: u32 },
}

impl FailedBatchPolicy {
    fn from_retries(retries: u32) -> Self {
        if retries == 0 {
            FailedBatchPolicy::Drop
        } else {
            FailedBatchPolicy::RetryNextTick {
                max_retries: retries,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub intake_port: u16,
    pub enrichment_url: String,
    pub analytics_url: String,
    /// Shared secret sent verbatim in the `Authorization` header to both upstreams.
    pub auth_token: String,
    /// Maximum number of enriched records waiting for dispatch.
    pub buffer_capacity: usize,
    pub max_batch_size: usize,
    /// how often the dispatcher drains the buffer, in seconds
    pub flush_interval_secs: u64,
    pub enrichment_retry: RetryPolicy,
    pub failed_batch_policy: FailedBatchPolicy,
    /// Timeout for each outbound request, in seconds
    pub request_timeout_secs: u64,
    pub max_request_content_length: usize,
    pub proxy_url: Option<String>,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let auth_token = env::var("EVENT_PIPELINE_AUTH_TOKEN").map_err(|_| {
            anyhow::anyhow!("EVENT_PIPELINE_AUTH_TOKEN environment variable is not set")
        })?;

        let intake_port = match env::var("EVENT_PIPELINE_PORT") {
            Ok(port) => port.parse::<u16>().map_err(|_| {
                anyhow::anyhow!("Invalid EVENT_PIPELINE_PORT value: {port}")
            })?,
            Err(_) => DEFAULT_INTAKE_PORT,
        };

        let enrichment_url = env::var("EVENT_PIPELINE_ENRICHMENT_URL")
            .unwrap_or_else(|_| DEFAULT_ENRICHMENT_URL.to_string());
        let analytics_url = env::var("EVENT_PIPELINE_ANALYTICS_URL")
            .unwrap_or_else(|_| DEFAULT_ANALYTICS_URL.to_string());

        let failed_batch_retries = match env::var("EVENT_PIPELINE_FAILED_BATCH_RETRIES") {
            Ok(val) => val.parse::<u32>().map_err(|_| {
                anyhow::anyhow!("Invalid EVENT_PIPELINE_FAILED_BATCH_RETRIES value: {val}")
            })?,
            Err(_) => 0,
        };

        Ok(Config {
            intake_port,
            enrichment_url,
            analytics_url,
            auth_token,
            failed_batch_policy: FailedBatchPolicy::from_retries(failed_batch_retries),
            proxy_url: env::var("EVENT_PIPELINE_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
            ..Config::default()
        })
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            intake_port: DEFAULT_INTAKE_PORT,
            enrichment_url: DEFAULT_ENRICHMENT_URL.to_string(),
            analytics_url: DEFAULT_ANALYTICS_URL.to_string(),
            auth_token: String::new(),
            buffer_capacity: 20,
            max_batch_size: 20,
            flush_interval_secs: 10,
            enrichment_retry: RetryPolicy::default(),
            failed_batch_policy: FailedBatchPolicy::Drop,
            request_timeout_secs: 30,
            max_request_content_length: 1024 * 1024, // 1MiB in Bytes
            proxy_url: None,
        }
    }
}
