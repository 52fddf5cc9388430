// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching scheduler that decides when queued log records are exported.
//!
//! Records are exported when either of two limits is hit:
//! 1. **Size**: the live batch reaches `max_messages` records
//! 2. **Staleness**: the oldest queued record has waited a full `timeout`
//!
//! # Concurrency
//!
//! Any number of threads may call [`Batcher::append`]. The live batch sits
//! behind a single mutex, and exports run while that mutex is held, so two
//! exports never interleave and each one carries a disjoint, ordered group.
//!
//! ```text
//!   producers ──append──┐
//!                       v
//!               ┌───────────────┐   full / stale   ┌──────────┐
//!               │ Mutex<Batch>  │ ───────────────> │ Exporter │
//!               └───────────────┘                  └──────────┘
//!                       ^
//!   poller thread ──────┘ (every `timeout`, stops on cancellation)
//! ```
//!
//! # Shutdown
//!
//! [`Batcher::shutdown`] swaps the append path for a no-op, drains whatever
//! is left, then stops and joins the poller. It runs at most once, and
//! dropping the batcher runs it too.

use crate::batch::Batch;
use crate::config::BatcherConfig;
use crate::errors;
use crate::export::{Chunked, Exporter};
use crate::record::Record;
use arc_swap::ArcSwap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, Once, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

const POLLER_THREAD_NAME: &str = "log-batcher-poller";

/// Why a batch is being exported. Only used for logging.
#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Full,
    Stale,
    Shutdown,
}

/// Entry point every `append` call is routed through.
///
/// Swapped for [`append_closed`] at shutdown, after which appends return
/// without touching the batch lock.
struct Appender<R> {
    call: fn(&Shared<R>, R),
}

/// Live batch plus whether the batcher has been drained.
struct Active<R> {
    batch: Batch<R>,
    closed: bool,
}

/// State shared between producers and the poller thread.
struct Shared<R> {
    active: Mutex<Active<R>>,
    appender: ArcSwap<Appender<R>>,
    exporter: Box<dyn Exporter<R>>,
    // Mirrors the batch length so it can be read without the lock.
    pending: AtomicUsize,
}

impl<R: Record> Shared<R> {
    // An exporter panic leaves the batch consistent (records were already
    // moved out), so a poisoned lock is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, Active<R>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn export(&self, active: &mut Active<R>, reason: FlushReason) {
        let records = active.batch.flush();
        self.pending.store(0, Ordering::Relaxed);
        if records.is_empty() {
            return;
        }
        debug!("Flushing {} log records ({:?})", records.len(), reason);
        self.exporter.export(records);
    }

    fn append(&self, record: R) {
        let mut active = self.lock();
        if active.closed {
            // Lost the race with shutdown after the appender was loaded.
            trace!("Dropping log record appended during shutdown");
            return;
        }
        if active.batch.append(record) {
            self.export(&mut active, FlushReason::Full);
        } else {
            self.pending.store(active.batch.len(), Ordering::Relaxed);
        }
    }

    /// Exports the batch if it was already waiting before `reference`, and
    /// returns the reference point for the next staleness check.
    fn flush_if_stale(&self, reference: SystemTime) -> SystemTime {
        let mut active = self.lock();
        let oldest = active.batch.timestamp();
        if is_stale(oldest, reference) {
            self.export(&mut active, FlushReason::Stale);
        } else if oldest.is_some() {
            trace!(
                "Batch of {} records started after the last check, not flushing",
                active.batch.len()
            );
        }
        SystemTime::now()
    }

    fn drain(&self) {
        let mut active = self.lock();
        active.closed = true;
        self.export(&mut active, FlushReason::Shutdown);
    }
}

fn append_active<R: Record>(shared: &Shared<R>, record: R) {
    shared.append(record);
}

fn append_closed<R: Record>(_shared: &Shared<R>, _record: R) {}

/// A batch is stale when its oldest record is no newer than the reference
/// point the current wait started from. An empty batch is never stale.
///
/// Records stamped exactly at the reference count as stale.
pub(crate) fn is_stale(oldest: Option<SystemTime>, reference: SystemTime) -> bool {
    oldest.is_some_and(|oldest| oldest <= reference)
}

/// Queues log records and hands them to an [`Exporter`] in groups.
///
/// # Example
///
/// ```
/// use log_batcher::{Batcher, BatcherConfig, LogRecord, Severity};
/// use std::time::Duration;
///
/// let config = BatcherConfig {
///     max_messages: 2,
///     timeout: Duration::ZERO,
///     export_chunk_size: 0,
/// };
/// let batcher = Batcher::start(&config, |records: Vec<LogRecord>| {
///     assert_eq!(records.len(), 2);
/// })
/// .expect("failed to start batcher");
///
/// batcher.append(LogRecord::new(Severity::Info, "first"));
/// batcher.append(LogRecord::new(Severity::Info, "second"));
/// batcher.shutdown();
/// ```
pub struct Batcher<R: Record> {
    shared: Arc<Shared<R>>,
    cancel_token: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
    shutdown_once: Once,
}

impl<R: Record> Batcher<R> {
    /// Creates a batcher and, if `config` has a staleness timeout, starts its
    /// poller thread.
    ///
    /// When `export_chunk_size` is set, `exporter` is wrapped so that no call
    /// carries more than that many records.
    pub fn start<E>(config: &BatcherConfig, exporter: E) -> Result<Self, errors::Creation>
    where
        E: Exporter<R> + 'static,
    {
        let exporter: Box<dyn Exporter<R>> = match config.chunk_size() {
            Some(size) => Box::new(Chunked::new(size, exporter)),
            None => Box::new(exporter),
        };

        let shared = Arc::new(Shared {
            active: Mutex::new(Active {
                batch: Batch::new(config.batch_capacity()),
                closed: false,
            }),
            appender: ArcSwap::from_pointee(Appender {
                call: append_active::<R>,
            }),
            exporter,
            pending: AtomicUsize::new(0),
        });

        let cancel_token = CancellationToken::new();
        let poller = match config.staleness_timeout() {
            Some(timeout) => Some(spawn_poller(
                Arc::clone(&shared),
                timeout,
                cancel_token.clone(),
            )?),
            None => None,
        };

        Ok(Self {
            shared,
            cancel_token,
            poller: Mutex::new(poller),
            shutdown_once: Once::new(),
        })
    }

    /// Queues a record, exporting the batch if this fills it.
    ///
    /// `None` is ignored, as is anything appended once shutdown has started.
    /// When this call fills the batch the export runs on the calling thread.
    pub fn append(&self, record: impl Into<Option<R>>) {
        let Some(record) = record.into() else {
            return;
        };
        let call = self.shared.appender.load().call;
        call(&self.shared, record);
    }

    /// Number of records waiting in the live batch.
    ///
    /// Does not take the batch lock, so it is safe to call from inside the
    /// exporter, where it reads zero.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_once.is_completed()
    }

    /// Exports any queued records and stops the poller.
    ///
    /// Only the first call does any work. Concurrent callers wait for it to
    /// finish, later ones return immediately. Once this returns the exporter
    /// is never called again.
    ///
    /// Must not be called from inside the exporter.
    pub fn shutdown(&self) {
        // A panicking exporter poisons the `Once`; every step below is safe to
        // repeat, so run it again rather than propagating the panic.
        self.shutdown_once.call_once_force(|_| self.shutdown_inner());
    }

    fn shutdown_inner(&self) {
        debug!("Log batcher shutting down");

        self.shared.appender.store(Arc::new(Appender {
            call: append_closed::<R>,
        }));

        // Taking the lock after the swap waits out any append already inside
        // its critical section.
        self.shared.drain();

        self.cancel_token.cancel();
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            if poller.join().is_err() {
                error!("Staleness poller panicked before shutdown");
            }
        }

        debug!("Log batcher stopped");
    }
}

impl<R: Record> Drop for Batcher<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<R: Record> std::fmt::Debug for Batcher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("pending", &self.pending())
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

fn spawn_poller<R: Record>(
    shared: Arc<Shared<R>>,
    timeout: Duration,
    cancel_token: CancellationToken,
) -> Result<JoinHandle<()>, errors::Creation> {
    // The runtime is built and dropped on the poller thread only; dropping a
    // runtime on a caller that is itself inside a runtime panics.
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let poller = thread::Builder::new()
        .name(POLLER_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            runtime.block_on(poll(shared, timeout, cancel_token));
        })
        .map_err(errors::Creation::Spawn)?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(poller),
        Ok(Err(e)) => {
            let _ = poller.join();
            Err(errors::Creation::Runtime(e))
        }
        Err(_) => {
            let _ = poller.join();
            Err(errors::Creation::Runtime(std::io::Error::other(
                "staleness poller exited during startup",
            )))
        }
    }
}

/// Exports the batch once it has been sitting for a full `timeout`.
///
/// Each wait starts from a reference point. When the wait ends, only a batch
/// whose oldest record predates that reference is exported; a batch started
/// during the wait gets a fresh full interval instead.
async fn poll<R: Record>(
    shared: Arc<Shared<R>>,
    timeout: Duration,
    cancel_token: CancellationToken,
) {
    debug!("Staleness poller started with timeout {:?}", timeout);

    let mut reference = SystemTime::now();
    let mut deadline = next_deadline(timeout);
    loop {
        tokio::select! {
            biased;
            () = cancel_token.cancelled() => break,
            () = tokio::time::sleep_until(deadline) => {
                reference = panic::catch_unwind(AssertUnwindSafe(|| {
                    shared.flush_if_stale(reference)
                }))
                .unwrap_or_else(|_| {
                    error!("Exporter panicked during a staleness flush, records dropped");
                    SystemTime::now()
                });
                deadline = next_deadline(timeout);
            }
        }
    }

    debug!("Staleness poller stopped");
}

// Timeouts too large to represent never fire.
fn next_deadline(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 30))
}
