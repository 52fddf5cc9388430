// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hand-off point between the batcher and whatever ships records downstream.
//!
//! Exports are fire-and-forget from the batcher's point of view: an exporter
//! owns the records it is given and deals with its own failures.

use std::num::NonZeroUsize;
use tracing::trace;

/// Receives groups of records flushed by the batcher.
///
/// Calls are made synchronously while the batcher's buffer lock is held, so a
/// slow exporter throttles producers.
pub trait Exporter<R>: Send + Sync {
    fn export(&self, records: Vec<R>);
}

impl<R, F> Exporter<R> for F
where
    F: Fn(Vec<R>) + Send + Sync,
{
    fn export(&self, records: Vec<R>) {
        self(records)
    }
}

/// Exporter that drops everything it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl<R> Exporter<R> for Discard {
    fn export(&self, _records: Vec<R>) {}
}

/// Splits every group into consecutive chunks of at most `size` records and
/// exports them in order.
#[derive(Debug, Clone)]
pub struct Chunked<E> {
    size: NonZeroUsize,
    inner: E,
}

impl<E> Chunked<E> {
    pub fn new(size: NonZeroUsize, inner: E) -> Self {
        Self { size, inner }
    }

    pub fn size(&self) -> NonZeroUsize {
        self.size
    }
}

impl<R, E> Exporter<R> for Chunked<E>
where
    E: Exporter<R>,
{
    fn export(&self, records: Vec<R>) {
        let size = self.size.get();
        let mut records = records.into_iter();
        loop {
            let chunk: Vec<R> = records.by_ref().take(size).collect();
            if chunk.is_empty() {
                break;
            }
            trace!("Exporting chunk of {} records", chunk.len());
            self.inner.export(chunk);
        }
    }
}
