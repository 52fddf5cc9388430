// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Deserializer};
use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_MAX_MESSAGES: u64 = 512;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Batching thresholds for a [`Batcher`](crate::batcher::Batcher).
///
/// Out of range values are never rejected, they switch the matching feature
/// off instead.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Records to queue before exporting. Zero or one exports every record as
    /// it arrives.
    pub max_messages: u64,
    /// Longest a non-empty batch may wait for more records. Zero disables
    /// staleness based exports.
    #[serde(rename = "timeout_ms", deserialize_with = "deserialize_millis")]
    pub timeout: Duration,
    /// Largest group handed to the exporter in one call. Zero exports a whole
    /// batch at once.
    pub export_chunk_size: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            timeout: DEFAULT_TIMEOUT,
            export_chunk_size: 0,
        }
    }
}

impl BatcherConfig {
    /// Configuration that exports each record immediately.
    #[must_use]
    pub fn unbatched() -> Self {
        Self {
            max_messages: 1,
            timeout: Duration::ZERO,
            export_chunk_size: 0,
        }
    }

    /// Capacity of the live batch, at least one.
    #[must_use]
    pub fn batch_capacity(&self) -> usize {
        usize::try_from(self.max_messages)
            .unwrap_or(usize::MAX)
            .max(1)
    }

    #[must_use]
    pub fn staleness_timeout(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    #[must_use]
    pub fn chunk_size(&self) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.export_chunk_size)
    }
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    // Negative values are accepted and mean "disabled".
    let millis = i64::deserialize(deserializer)?;
    Ok(Duration::from_millis(u64::try_from(millis).unwrap_or(0)))
}
