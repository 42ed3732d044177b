// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod analytics_sender;
pub mod batch_buffer;
pub mod config;
pub mod dispatcher;
pub mod enrichment_client;
pub mod error;
pub mod http_utils;
pub mod intake;
pub mod pipeline;
pub mod record;
