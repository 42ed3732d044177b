// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::analytics_sender::AnalyticsSender;
use crate::batch_buffer::BatchBuffer;
use crate::config::FailedBatchPolicy;
use crate::record::Record;

/// Source of flush ticks for the dispatcher.
#[async_trait]
pub trait FlushTicker {
    /// Completes when the next flush is due.
    async fn tick(&mut self);
}

/// Ticks every `period` of wall-clock time, starting one period from creation.
///
/// Ticks that are missed while a flush is still running are delayed rather than fired in a burst,
/// so two ticks are never closer than `period`.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalTicker { interval }
    }
}

#[async_trait]
impl FlushTicker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Result of a single flush cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was waiting; no call was made to the sink.
    Idle,
    Sent { records: usize, items_ingested: u64 },
    /// The sink refused the batch and it is kept for the next tick.
    Retained { records: usize },
    /// The sink refused the batch and it is lost.
    Dropped { records: usize },
}

struct PendingBatch {
    records: Vec<Record>,
    retries_left: u32,
}

/// The single consumer of the batch buffer. Each flush sends at most one batch of at most
/// `max_batch_size` records, which caps sink throughput at `max_batch_size` per tick period.
pub struct BatchDispatcher {
    buffer: Arc<BatchBuffer>,
    sender: Arc<dyn AnalyticsSender + Send + Sync>,
    max_batch_size: usize,
    failed_batch_policy: FailedBatchPolicy,
    pending: Option<PendingBatch>,
}

impl BatchDispatcher {
    pub fn new(
        buffer: Arc<BatchBuffer>,
        sender: Arc<dyn AnalyticsSender + Send + Sync>,
        max_batch_size: usize,
        failed_batch_policy: FailedBatchPolicy,
    ) -> Self {
        BatchDispatcher {
            buffer,
            sender,
            max_batch_size,
            failed_batch_policy,
            pending: None,
        }
    }

    /// Flushes once per tick until `cancel` fires. A flush in progress is always completed.
    pub async fn run<T>(mut self, mut ticker: T, cancel: CancellationToken)
    where
        T: FlushTicker + Send,
    {
        debug!("Batch dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        let unflushed = self.buffer.len().await
            + self.pending.as_ref().map_or(0, |pending| pending.records.len());
        if unflushed > 0 {
            warn!(
                "Batch dispatcher stopped with {unflushed} records not sent to the analytics service"
            );
        } else {
            debug!("Batch dispatcher stopped");
        }
    }

    /// Runs one flush cycle: resend the retained batch if there is one, otherwise drain up to
    /// `max_batch_size` records from the buffer and send them.
    pub async fn flush(&mut self) -> FlushOutcome {
        let batch = match self.pending.take() {
            Some(pending) => {
                debug!(
                    "Retrying previously failed batch of {} records",
                    pending.records.len()
                );
                pending
            }
            None => {
                let records = self.buffer.drain(self.max_batch_size).await;
                if records.is_empty() {
                    return FlushOutcome::Idle;
                }
                PendingBatch {
                    records,
                    retries_left: match self.failed_batch_policy {
                        FailedBatchPolicy::Drop => 0,
                        FailedBatchPolicy::RetryNextTick { max_retries } => max_retries,
                    },
                }
            }
        };

        let records = batch.records.len();
        match self.sender.send(&batch.records).await {
            Ok(report) => FlushOutcome::Sent {
                records,
                items_ingested: report.items_ingested,
            },
            Err(e) if batch.retries_left > 0 => {
                error!(
                    "Failed to send batch of {records} records to analytics service: {e}, retrying on next flush"
                );
                self.pending = Some(PendingBatch {
                    records: batch.records,
                    retries_left: batch.retries_left - 1,
                });
                FlushOutcome::Retained { records }
            }
            Err(e) => {
                error!(
                    "Failed to send batch of {records} records to analytics service: {e}, batch dropped"
                );
                FlushOutcome::Dropped { records }
            }
        }
    }
}
