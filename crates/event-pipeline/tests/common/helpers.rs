// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use async_trait::async_trait;
use event_pipeline::config::Config;
use event_pipeline::dispatcher::FlushTicker;
use event_pipeline::enrichment_client::RetryPolicy;
use event_pipeline::pipeline::Pipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const AUTH_TOKEN: &str = "test-shared-secret";
pub const BACKOFF: Duration = Duration::from_millis(40);

/// Ticks whenever the test says so.
pub struct ManualTicker(pub mpsc::Receiver<()>);

#[async_trait]
impl FlushTicker for ManualTicker {
    async fn tick(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct RunningPipeline {
    pub pipeline: Arc<Pipeline>,
    pub addr: SocketAddr,
    pub tick_tx: mpsc::Sender<()>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<(), String>>,
}

impl RunningPipeline {
    pub fn process_url(&self) -> String {
        format!("http://{}/process", self.addr)
    }
}

pub fn test_config(enrichment_url: String, analytics_url: String) -> Config {
    Config {
        enrichment_url,
        analytics_url,
        auth_token: AUTH_TOKEN.to_string(),
        enrichment_retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: BACKOFF,
        },
        request_timeout_secs: 5,
        ..Config::default()
    }
}

/// Starts the pipeline on an ephemeral port with a manually driven flush ticker.
pub async fn start_pipeline(config: Config) -> RunningPipeline {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind intake listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let pipeline = Arc::new(Pipeline::from_config(Arc::new(config)));
    let (tick_tx, tick_rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();

    let handle = {
        let pipeline = Arc::clone(&pipeline);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            pipeline
                .serve(listener, ManualTicker(tick_rx), cancel)
                .await
                .map_err(|e| e.to_string())
        })
    };

    RunningPipeline {
        pipeline,
        addr,
        tick_tx,
        cancel,
        handle,
    }
}

pub fn submission(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "asset_name": format!("host-{id}"),
        "ip": "10.20.30.40",
        "created_utc": "2024-06-01T08:30:00Z",
        "source": "edr",
        "category": "phising",
    })
}

pub async fn submit(client: &reqwest::Client, url: &str, id: &str) -> reqwest::StatusCode {
    client
        .post(url)
        .json(&submission(id))
        .send()
        .await
        .expect("intake request failed")
        .status()
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}

pub fn batch_ids(batch: &serde_json::Value) -> Vec<String> {
    batch
        .as_array()
        .expect("batch is not an array")
        .iter()
        .map(|record| record["id"].as_str().unwrap_or_default().to_string())
        .collect()
}
