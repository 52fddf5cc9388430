// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Log Batcher
//!
//! Client-side batching of log records ahead of an OTLP exporter.
//!
//! ## Overview
//!
//! Log calls from any number of threads are appended to a [`Batcher`], which
//! groups them and hands each group to an [`Exporter`] once the batch is full
//! or has gone stale. Delivery itself is the exporter's job; the batcher only
//! decides *when* records leave.
//!
//! - [`batch`]: fixed capacity buffer holding the live batch
//! - [`batcher`]: size and staleness triggers, background poller, shutdown
//! - [`export`]: exporter seam and the chunking adapter
//! - [`config`]: batching thresholds
//! - [`record`]: the record trait and a concrete OTLP-shaped log record

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]

pub mod batch;
pub mod batcher;
pub mod config;
pub mod errors;
pub mod export;
pub mod record;

pub use batcher::Batcher;
pub use config::BatcherConfig;
pub use export::{Chunked, Discard, Exporter};
pub use record::{LogRecord, Record, Severity};
