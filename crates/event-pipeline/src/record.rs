// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// A single security event flowing through the pipeline.
///
/// Inbound submissions carry the six source fields. `asn` and `correlation_id` are filled in by
/// the enrichment service, which also overwrites `category` with its authoritative value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub asset_name: String,
    pub ip: String,
    /// ISO-8601 timestamp, carried through untouched.
    pub created_utc: String,
    pub source: String,
    pub category: String,
    #[serde(default)]
    pub asn: String,
    #[serde(default, rename = "correlationId")]
    pub correlation_id: i64,
}

/// Body sent to the enrichment endpoint.
#[derive(Debug, Serialize)]
pub struct EnrichmentRequest<'a> {
    pub id: &'a str,
    pub asset: &'a str,
    pub ip: &'a str,
    pub category: &'a str,
}

impl<'a> From<&'a Record> for EnrichmentRequest<'a> {
    fn from(record: &'a Record) -> Self {
        EnrichmentRequest {
            id: &record.id,
            asset: &record.asset_name,
            ip: &record.ip,
            category: &record.category,
        }
    }
}

/// Attribution fields returned by the enrichment endpoint on success.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EnrichmentResponse {
    pub asn: String,
    pub category: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: i64,
}

impl Record {
    /// Overwrites the enrichment-owned fields, leaving the source fields as submitted.
    pub fn apply_enrichment(&mut self, enrichment: EnrichmentResponse) {
        self.asn = enrichment.asn;
        self.category = enrichment.category;
        self.correlation_id = enrichment.correlation_id;
    }
}

/// Acknowledgement returned by the analytics sink for a delivered batch.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IngestReport {
    pub status: String,
    #[serde(rename = "itemsIngested")]
    pub items_ingested: u64,
}
