// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Failure of a single enrichment attempt, or of the whole retry sequence.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("enrichment request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("enrichment service returned status {status}, response: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed enrichment response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to enrich record {id} after {attempts} attempts: {last}")]
    Exhausted {
        id: String,
        attempts: u32,
        last: Box<EnrichmentError>,
    },
}

/// Failure to deliver a batch to the analytics sink.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("analytics request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analytics service returned status {status}, response: {body}")]
    Status { status: StatusCode, body: String },

    #[error("malformed analytics response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Returned when a record is offered to a buffer that no longer accepts records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("batch buffer is closed")]
pub struct BufferClosed;

/// Reasons an inbound submission is rejected.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Invalid JSON format: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to enrich record: {0}")]
    Enrichment(#[from] EnrichmentError),

    #[error("Pipeline is shutting down: {0}")]
    BufferClosed(#[from] BufferClosed),
}

impl IntakeError {
    /// Status code reported to the submitting client.
    pub fn status_code(&self) -> hyper::StatusCode {
        match self {
            IntakeError::Decode(_) => hyper::StatusCode::BAD_REQUEST,
            IntakeError::Enrichment(_) => hyper::StatusCode::INTERNAL_SERVER_ERROR,
            IntakeError::BufferClosed(_) => hyper::StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}
