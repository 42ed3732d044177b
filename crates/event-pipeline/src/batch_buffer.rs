// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO holding area between enrichment and dispatch.
//!
//! Producers reserve a slot before pushing, so `enqueue` suspends while the buffer is full and
//! resumes as soon as a drain frees slots. That suspension is the only backpressure the intake
//! path applies; records are never dropped for lack of room.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Semaphore};
use tracing::debug;

use crate::error::BufferClosed;
use crate::record::Record;

pub struct BatchBuffer {
    queue: Mutex<VecDeque<Record>>,
    /// One permit per free slot.
    free_slots: Semaphore,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        BatchBuffer {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            free_slots: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Appends a record, waiting for a free slot if the buffer is full.
    ///
    /// Fails only if the buffer was closed before a slot became available.
    pub async fn enqueue(&self, record: Record) -> Result<(), BufferClosed> {
        let permit = self
            .free_slots
            .acquire()
            .await
            .map_err(|_| BufferClosed)?;
        // The slot is handed back by `drain`, not by dropping the permit.
        permit.forget();
        self.queue.lock().await.push_back(record);
        Ok(())
    }

    /// Removes up to `max` records from the front of the buffer, oldest first.
    pub async fn drain(&self, max: usize) -> Vec<Record> {
        let batch: Vec<Record> = {
            let mut queue = self.queue.lock().await;
            let n = queue.len().min(max);
            queue.drain(..n).collect()
        };
        if !batch.is_empty() {
            debug!("Drained {} records from the batch buffer", batch.len());
            self.free_slots.add_permits(batch.len());
        }
        batch
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stops accepting records. Producers waiting for a slot are woken with [`BufferClosed`];
    /// records already buffered can still be drained.
    pub fn close(&self) {
        self.free_slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.free_slots.is_closed()
    }
}
