// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{body::Body, http, Method, Request, StatusCode};
use tracing::{debug, error};

use crate::batch_buffer::BatchBuffer;
use crate::enrichment_client::Enricher;
use crate::error::IntakeError;
use crate::http_utils::{
    create_record_processed_http_response, log_and_create_http_response,
    verify_request_content_length, HttpResponse,
};
use crate::record::Record;

pub const PROCESS_ENDPOINT_PATH: &str = "/process";

/// Accepts one submitted record per request. A submission is acknowledged only once the record
/// has been enriched and accepted by the batch buffer.
#[derive(Clone)]
pub struct IntakeHandler {
    enricher: Arc<dyn Enricher + Send + Sync>,
    buffer: Arc<BatchBuffer>,
    max_request_content_length: usize,
}

impl IntakeHandler {
    pub fn new(
        enricher: Arc<dyn Enricher + Send + Sync>,
        buffer: Arc<BatchBuffer>,
        max_request_content_length: usize,
    ) -> Self {
        IntakeHandler {
            enricher,
            buffer,
            max_request_content_length,
        }
    }

    /// Routes an HTTP request to the process endpoint.
    pub async fn handle_request<B>(&self, req: Request<B>) -> http::Result<HttpResponse>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match (req.method(), req.uri().path()) {
            (&Method::POST, PROCESS_ENDPOINT_PATH) => {
                if let Some(response) = verify_request_content_length(
                    req.headers(),
                    self.max_request_content_length,
                    "Error processing record",
                ) {
                    return response;
                }

                // Chunked bodies carry no Content-Length, so the limit is enforced while reading.
                let body = Limited::new(req.into_body(), self.max_request_content_length);
                let body = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) if e.is::<LengthLimitError>() => {
                        return log_and_create_http_response(
                            "Error processing record: Payload too large",
                            StatusCode::PAYLOAD_TOO_LARGE,
                        );
                    }
                    Err(e) => {
                        return log_and_create_http_response(
                            &format!("Failed to read request body: {e}"),
                            StatusCode::BAD_REQUEST,
                        );
                    }
                };

                match self.process_record(&body).await {
                    Ok(id) => create_record_processed_http_response(&id),
                    Err(e) => log_and_create_http_response(&e.to_string(), e.status_code()),
                }
            }
            (_, PROCESS_ENDPOINT_PATH) => log_and_create_http_response(
                &format!("Unsupported method {} for {PROCESS_ENDPOINT_PATH}", req.method()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (_, path) => log_and_create_http_response(
                &format!("Unknown endpoint {path}"),
                StatusCode::NOT_FOUND,
            ),
        }
    }

    /// Decodes, enriches and buffers one serialized record. Returns the record id once the
    /// buffer has taken ownership of the enriched record.
    pub async fn process_record(&self, body: &[u8]) -> Result<String, IntakeError> {
        let record: Record = serde_json::from_slice(body).map_err(IntakeError::Decode)?;
        let id = record.id.clone();
        debug!("Received record {id}");

        let enriched = self.enricher.enrich(record).await.map_err(|e| {
            error!("Error enriching record with ID {id}: {e}");
            IntakeError::from(e)
        })?;

        // Suspends while the buffer is full.
        self.buffer.enqueue(enriched).await?;
        Ok(id)
    }
}
