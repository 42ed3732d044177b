// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use event_submitter::source_file::{filter_by_category, filter_by_id, read_records};
use event_submitter::submitter::{Submitter, DEFAULT_ENDPOINT, DEFAULT_WORKERS};

/// Submit security events from a `;`-separated file to the event pipeline.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Input file; the first line is treated as a header
    #[arg(long, default_value = "data.csv")]
    file: PathBuf,

    /// Only submit records with this category (case-insensitive)
    #[arg(long)]
    category: Option<String>,

    /// Only submit the record with this id (case-insensitive)
    #[arg(long)]
    id: Option<String>,

    /// Intake endpoint of the event pipeline
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Number of concurrent submissions
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("h2=off,hyper=off,rustls=off,info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .without_time()
        .init();

    let args = Args::parse();
    debug!("Starting event submitter with {args:?}");

    let parsed = match read_records(&args.file) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("Error reading records: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut records = parsed.records;
    if let Some(category) = &args.category {
        records = filter_by_category(records, category);
    }
    if let Some(id) = &args.id {
        records = filter_by_id(records, id);
    }
    let processed = records.len();
    info!("Submitting {processed} records to {}", args.endpoint);

    let submitter = match Submitter::new(args.endpoint) {
        Ok(submitter) => submitter,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let report = submitter.submit_all(records, args.workers).await;

    println!("Records processed: {processed}");
    println!("Records sent: {}", report.sent);
    println!("Records failed: {}", report.failed_ids.len());
    if !parsed.skipped_lines.is_empty() {
        let lines: Vec<String> = parsed
            .skipped_lines
            .iter()
            .map(|line| line.to_string())
            .collect();
        println!("Skipped lines: {}", lines.join(", "));
    }

    if report.failed_ids.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
