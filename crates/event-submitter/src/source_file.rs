// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reader for `;`-separated event exports.
//!
//! The first line is a header and is always skipped. Every other row must hold exactly six
//! fields: id, asset name, ip, created timestamp, source and category. Fields may be wrapped in
//! double quotes, with `""` standing for a literal quote; a quoted field may span lines. Blank
//! lines are ignored.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use serde::Serialize;
use tracing::warn;

use crate::category::normalize_category;
use crate::error::SubmitterError;

const DELIMITER: u8 = b';';
const QUOTE: u8 = b'"';
const FIELD_COUNT: usize = 6;

/// One event as submitted to the pipeline's intake endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub id: String,
    pub asset_name: String,
    pub ip: String,
    pub created_utc: String,
    pub source: String,
    pub category: String,
}

#[derive(Debug, Default)]
pub struct ParsedFile {
    pub records: Vec<SourceRecord>,
    /// 1-based line numbers (where the row starts) of rows that could not be turned into a
    /// record.
    pub skipped_lines: Vec<u64>,
}

pub fn read_records(path: &Path) -> Result<ParsedFile, SubmitterError> {
    let file = File::open(path).map_err(|source| SubmitterError::Open {
        path: path.display().to_string(),
        source,
    })?;
    parse_records(file)
}

pub fn parse_records<R: Read>(mut reader: R) -> Result<ParsedFile, SubmitterError> {
    let mut input = Vec::new();
    reader.read_to_end(&mut input)?;

    let mut rows = Vec::new();
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_slice());
    for row in csv_reader.byte_records() {
        let row = row?;
        let (line, offset) = row
            .position()
            .map_or((0, 0), |position| (position.line(), position.byte() as usize));
        rows.push((line, offset, row));
    }

    let mut parsed = ParsedFile::default();
    for (index, (line_number, offset, row)) in rows.iter().enumerate() {
        if *line_number <= 1 {
            continue;
        }
        let next_offset = rows.get(index + 1).map_or(input.len(), |(_, next, _)| *next);
        let raw = input.get(*offset..next_offset).unwrap_or_default();

        match to_source_record(raw, row) {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                warn!("Skipping line {line_number} due to {reason}");
                parsed.skipped_lines.push(*line_number);
            }
        }
    }

    Ok(parsed)
}

fn to_source_record(raw: &[u8], row: &ByteRecord) -> Result<SourceRecord, String> {
    if has_misplaced_quote(raw) {
        return Err("a bare or extraneous quote".to_string());
    }
    if row.len() != FIELD_COUNT {
        return Err(format!(
            "incorrect number of fields (expected {FIELD_COUNT}, got {})",
            row.len()
        ));
    }

    let field = |i: usize| String::from_utf8_lossy(row.get(i).unwrap_or_default()).into_owned();
    let category = normalize_category(&field(5));
    if category.is_empty() {
        return Err("blank category field".to_string());
    }

    Ok(SourceRecord {
        id: field(0),
        asset_name: field(1),
        ip: field(2),
        created_utc: field(3),
        source: field(4),
        category,
    })
}

/// Rejects quoting the csv reader would otherwise tolerate: a quote inside an unquoted field,
/// text after the closing quote of a quoted field, or a quoted field that is never closed.
fn has_misplaced_quote(raw: &[u8]) -> bool {
    let mut at_field_start = true;
    let mut in_quotes = false;
    let mut bytes = raw.iter().copied().peekable();

    while let Some(b) = bytes.next() {
        if in_quotes {
            if b == QUOTE {
                match bytes.peek() {
                    Some(&QUOTE) => {
                        bytes.next();
                    }
                    None | Some(&DELIMITER) | Some(&b'\r') | Some(&b'\n') => in_quotes = false,
                    Some(_) => return true,
                }
            }
            continue;
        }
        match b {
            QUOTE if at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            QUOTE => return true,
            DELIMITER | b'\r' | b'\n' => at_field_start = true,
            _ => at_field_start = false,
        }
    }

    in_quotes
}

/// Keeps records whose category equals `category`, ignoring case.
pub fn filter_by_category(records: Vec<SourceRecord>, category: &str) -> Vec<SourceRecord> {
    records
        .into_iter()
        .filter(|record| record.category.eq_ignore_ascii_case(category))
        .collect()
}

/// Keeps records whose id equals `id`, ignoring case.
pub fn filter_by_id(records: Vec<SourceRecord>, id: &str) -> Vec<SourceRecord> {
    records
        .into_iter()
        .filter(|record| record.id.eq_ignore_ascii_case(id))
        .collect()
}
