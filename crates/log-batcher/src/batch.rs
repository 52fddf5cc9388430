// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed capacity holding area for records waiting to be exported.
//!
//! A [`Batch`] does no synchronization of its own. The batcher keeps it behind
//! a mutex and only touches it while holding that lock.

use crate::record::Record;
use std::time::SystemTime;

// Upfront allocation cap. Larger batches grow on demand, so a huge
// `max_messages` only acts as a threshold.
const MAX_INITIAL_ALLOCATION: usize = 1024;

#[derive(Debug)]
pub struct Batch<R> {
    items: Vec<R>,
    capacity: usize,
}

impl<R: Record> Batch<R> {
    /// Creates an empty batch. A capacity of zero is treated as one, meaning
    /// every record fills the batch on its own.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity.min(MAX_INITIAL_ALLOCATION)),
            capacity,
        }
    }

    /// Appends a record and returns true once the batch is full.
    pub fn append(&mut self, record: R) -> bool {
        self.items.push(record);
        self.items.len() >= self.capacity
    }

    /// Creation time of the oldest record held, if any.
    pub fn timestamp(&self) -> Option<SystemTime> {
        self.items.first().map(|record| record.timestamp())
    }

    /// Hands over every held record and leaves the batch empty.
    ///
    /// The returned vector owns fresh storage while the batch keeps its own
    /// allocation for the next round of appends.
    pub fn flush(&mut self) -> Vec<R> {
        let mut flushed = Vec::with_capacity(self.items.len());
        flushed.extend(self.items.drain(..));
        flushed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_batch_reports_full_at_capacity() {
        let mut batch = Batch::new(3);

        assert!(!batch.append(at(1)));
        assert!(!batch.append(at(2)));
        assert!(batch.append(at(3)));
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_zero_capacity_is_normalized() {
        let mut batch = Batch::new(0);
        assert_eq!(batch.capacity(), 1);
        assert!(batch.append(at(1)));
    }

    #[test]
    fn test_huge_capacity_is_only_a_threshold() {
        let mut batch = Batch::new(usize::MAX);
        assert_eq!(batch.capacity(), usize::MAX);

        for secs in 0..2000 {
            assert!(!batch.append(at(secs)));
        }
        assert_eq!(batch.len(), 2000);
        assert_eq!(batch.flush().len(), 2000);
    }

    #[test]
    fn test_timestamp_is_oldest_record() {
        let mut batch = Batch::new(10);
        assert_eq!(batch.timestamp(), None);

        batch.append(at(5));
        batch.append(at(1));
        assert_eq!(batch.timestamp(), Some(at(5)));
    }

    #[test]
    fn test_flush_returns_records_in_order_and_resets() {
        let mut batch = Batch::new(4);
        batch.append(at(1));
        batch.append(at(2));

        let flushed = batch.flush();
        assert_eq!(flushed, vec![at(1), at(2)]);
        assert!(batch.is_empty());
        assert_eq!(batch.timestamp(), None);
        assert_eq!(batch.capacity(), 4);

        // The buffer is reused; the flushed group is unaffected by new appends.
        batch.append(at(3));
        assert_eq!(flushed, vec![at(1), at(2)]);
        assert_eq!(batch.flush(), vec![at(3)]);
    }

    #[test]
    fn test_flush_of_empty_batch() {
        let mut batch: Batch<SystemTime> = Batch::new(2);
        assert!(batch.flush().is_empty());
        assert_eq!(batch.len(), 0);
    }
}
