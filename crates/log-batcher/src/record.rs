// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records as seen by the batcher.
//!
//! The batcher treats records as opaque values. The only thing it ever asks of
//! a record is when it was created, which decides whether the batch it heads
//! has gone stale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A unit of log data that can be queued by a [`Batcher`](crate::batcher::Batcher).
pub trait Record: Send + 'static {
    /// Logical creation time of the record.
    fn timestamp(&self) -> SystemTime;
}

impl Record for SystemTime {
    fn timestamp(&self) -> SystemTime {
        *self
    }
}

/// Severity of a log record, using the OTLP severity number ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// First OTLP `SeverityNumber` of the range covered by this severity.
    #[must_use]
    pub fn number(self) -> i32 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
            Severity::Fatal => 21,
        }
    }
}

/// A formatted log record ready for export.
///
/// Field names follow the OTLP `LogRecord` message so that an exporter can map
/// them one to one onto the wire type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Time the event occurred, in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,
    /// Time the event was observed by the logging pipeline.
    pub observed_time_unix_nano: u64,
    pub severity: Severity,
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    pub fn new(severity: Severity, body: impl Into<String>) -> Self {
        let now = unix_nanos(SystemTime::now());
        Self {
            time_unix_nano: now,
            observed_time_unix_nano: now,
            severity,
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Overrides the event time, keeping the observed time.
    #[must_use]
    pub fn at(mut self, time: SystemTime) -> Self {
        self.time_unix_nano = unix_nanos(time);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Record for LogRecord {
    fn timestamp(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.time_unix_nano)
    }
}

// Times before the epoch clamp to zero, times past 2554 saturate.
fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
