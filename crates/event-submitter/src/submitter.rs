// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{SubmitError, SubmitterError};
use crate::source_file::SourceRecord;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8081/process";
pub const DEFAULT_WORKERS: usize = 20;

// The pipeline holds a submission open while its buffer is full, which can last a whole flush
// interval plus enrichment retries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SubmitReport {
    pub sent: usize,
    pub failed_ids: Vec<String>,
}

impl SubmitReport {
    fn merge(&mut self, other: SubmitReport) {
        self.sent += other.sent;
        self.failed_ids.extend(other.failed_ids);
    }
}

#[derive(Clone)]
pub struct Submitter {
    client: reqwest::Client,
    endpoint: String,
}

impl Submitter {
    pub fn new(endpoint: String) -> Result<Self, SubmitterError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SubmitterError::Client)?;
        Ok(Submitter { client, endpoint })
    }

    pub async fn submit(&self, record: &SourceRecord) -> Result<(), SubmitError> {
        let response = self.client.post(&self.endpoint).json(record).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::Status { status, body });
        }
        Ok(())
    }

    /// Posts every record using `workers` concurrent tasks pulling from a shared queue.
    pub async fn submit_all(&self, records: Vec<SourceRecord>, workers: usize) -> SubmitReport {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            // The channel is sized to hold every record.
            if tx.send(record).await.is_err() {
                break;
            }
        }
        drop(tx);

        let rx = Arc::new(Mutex::new(rx));
        let mut joinset = JoinSet::new();
        for worker in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            let submitter = self.clone();
            joinset.spawn(async move { submitter.run_worker(worker, rx).await });
        }

        let mut report = SubmitReport::default();
        while let Some(result) = joinset.join_next().await {
            match result {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => error!("Submit worker failed: {e}"),
            }
        }
        report
    }

    async fn run_worker(
        &self,
        worker: usize,
        rx: Arc<Mutex<mpsc::Receiver<SourceRecord>>>,
    ) -> SubmitReport {
        let mut report = SubmitReport::default();
        loop {
            let Some(record) = rx.lock().await.recv().await else {
                break;
            };
            match self.submit(&record).await {
                Ok(()) => {
                    debug!("Worker {worker} submitted record {}", record.id);
                    report.sent += 1;
                }
                Err(e) => {
                    error!("Error sending record {}: {e}", record.id);
                    report.failed_ids.push(record.id);
                }
            }
        }
        report
    }
}
