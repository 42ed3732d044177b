// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::SendError;
use crate::http_utils::build_client_or_default;
use crate::record::{IngestReport, Record};

#[async_trait]
pub trait AnalyticsSender {
    /// Delivers one batch to the analytics sink in a single call, preserving record order.
    /// Never retries; the caller decides what happens to a batch that failed.
    async fn send(&self, batch: &[Record]) -> Result<IngestReport, SendError>;
}

pub struct HttpAnalyticsSender {
    url: String,
    auth_token: String,
    client: reqwest::Client,
}

impl HttpAnalyticsSender {
    pub fn new(config: &Config) -> Self {
        let client =
            build_client_or_default(config.proxy_url.as_deref(), config.request_timeout());
        HttpAnalyticsSender {
            url: config.analytics_url.clone(),
            auth_token: config.auth_token.clone(),
            client,
        }
    }
}

#[async_trait]
impl AnalyticsSender for HttpAnalyticsSender {
    async fn send(&self, batch: &[Record]) -> Result<IngestReport, SendError> {
        let payload = serde_json::to_vec(batch).map_err(SendError::Serialize)?;

        debug!(
            "Analytics Sender | Sending batch of {} records ({} bytes)",
            batch.len(),
            payload.len()
        );

        let time = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, &self.auth_token)
            .body(payload)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SendError::Status { status, body });
        }

        let report: IngestReport = serde_json::from_str(&body).map_err(SendError::Decode)?;
        info!(
            "Analytics Sender | Successfully sent batch of {} records in {} ms, items ingested: {}",
            batch.len(),
            elapsed.as_millis(),
            report.items_ingested
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;

    fn test_sender(url: String) -> HttpAnalyticsSender {
        HttpAnalyticsSender::new(&Config {
            analytics_url: url,
            auth_token: "test-secret".to_string(),
            request_timeout_secs: 5,
            ..Config::default()
        })
    }

    fn enriched(id: &str, correlation_id: i64) -> Record {
        Record {
            id: id.to_string(),
            asset_name: format!("asset-{id}"),
            ip: "10.0.0.1".to_string(),
            created_utc: "2024-03-01T12:00:00Z".to_string(),
            source: "edr".to_string(),
            category: "phishing".to_string(),
            asn: "AS64500".to_string(),
            correlation_id,
        }
    }

    #[tokio::test]
    async fn test_send_posts_ordered_batch_with_auth() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/analytics")
            .match_header("authorization", "test-secret")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!([
                {
                    "id": "b", "asset_name": "asset-b", "ip": "10.0.0.1",
                    "created_utc": "2024-03-01T12:00:00Z", "source": "edr",
                    "category": "phishing", "asn": "AS64500", "correlationId": 2
                },
                {
                    "id": "a", "asset_name": "asset-a", "ip": "10.0.0.1",
                    "created_utc": "2024-03-01T12:00:00Z", "source": "edr",
                    "category": "phishing", "asn": "AS64500", "correlationId": 1
                }
            ])))
            .with_status(200)
            .with_body(r#"{"status":"ok","itemsIngested":2}"#)
            .create_async()
            .await;

        let sender = test_sender(format!("{}/analytics", server.url()));
        let report = sender
            .send(&[enriched("b", 2), enriched("a", 1)])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            report,
            IngestReport {
                status: "ok".to_string(),
                items_ingested: 2
            }
        );
    }

    #[tokio::test]
    async fn test_send_reports_status_and_body_on_rejection() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/analytics")
            .with_status(429)
            .with_body("slow down")
            .expect(1)
            .create_async()
            .await;

        let sender = test_sender(format!("{}/analytics", server.url()));
        let err = sender.send(&[enriched("a", 1)]).await.unwrap_err();

        mock.assert_async().await;
        match err {
            SendError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_malformed_ack_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/analytics")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let sender = test_sender(format!("{}/analytics", server.url()));
        let err = sender.send(&[enriched("a", 1)]).await.unwrap_err();
        assert!(matches!(err, SendError::Decode(_)));
    }

    #[tokio::test]
    async fn test_items_ingested_is_not_reconciled_with_batch_size() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/analytics")
            .with_status(200)
            .with_body(r#"{"status":"partial","itemsIngested":1}"#)
            .create_async()
            .await;

        let sender = test_sender(format!("{}/analytics", server.url()));
        let report = sender
            .send(&[enriched("a", 1), enriched("b", 2), enriched("c", 3)])
            .await
            .unwrap();
        assert_eq!(report.items_ingested, 1);
    }
}
