//! Bounded source feed
//!
//! Wraps a [`DocumentSource`] so that at most K documents exist between the
//! moment the reader admits them and the moment the writer has stored their
//! variants. Admission is a permit from a counting semaphore; the permit rides
//! along with the document through the worker pool and is released by the
//! writer, which closes the backpressure loop.
//!
//! The source is a blocking reader, so it runs on a dedicated thread and hands
//! records over a tokio channel.

use crate::error::{Error, Result};
use crate::source::{DocumentSource, Payload, RecordSink, SourceRecord};
use futures::Stream;
use serde::Serialize;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Default number of documents allowed in flight
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1000;

/// Upper bound on the reader hand-off queue (permits already bound it)
const FEED_CHANNEL_LIMIT: usize = 64;

/// Snapshot of permit accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermitStats {
    pub capacity: usize,
    pub in_flight: usize,
    /// Highest `in_flight` ever observed
    pub peak: usize,
    pub acquired: u64,
    pub released: u64,
}

struct PermitCounters {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Counting permit pool with capacity K
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct PermitPool {
    counters: Arc<PermitCounters>,
}

impl PermitPool {
    /// Create a pool with `capacity` permits (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            counters: Arc::new(PermitCounters {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.counters.capacity
    }

    /// Wait for a free permit
    ///
    /// Returns `None` only if the pool has been closed.
    pub async fn acquire(&self) -> Option<Permit> {
        let permit = self.counters.semaphore.clone().acquire_owned().await.ok()?;
        Some(self.track(permit))
    }

    /// Take a permit without waiting, if one is free
    pub fn try_acquire(&self) -> Option<Permit> {
        let permit = self.counters.semaphore.clone().try_acquire_owned().ok()?;
        Some(self.track(permit))
    }

    pub fn snapshot(&self) -> PermitStats {
        let c = &self.counters;
        PermitStats {
            capacity: c.capacity,
            in_flight: c.in_flight.load(Ordering::SeqCst),
            peak: c.peak.load(Ordering::SeqCst),
            acquired: c.acquired.load(Ordering::SeqCst),
            released: c.released.load(Ordering::SeqCst),
        }
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> Permit {
        let c = &self.counters;
        let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(now, Ordering::SeqCst);
        c.acquired.fetch_add(1, Ordering::SeqCst);
        Permit {
            _permit: permit,
            counters: Arc::clone(&self.counters),
        }
    }
}

impl std::fmt::Debug for PermitPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermitPool")
            .field("stats", &self.snapshot())
            .finish()
    }
}

/// One unit of in-flight capacity
///
/// Returned to the pool when released or dropped, whichever comes first.
pub struct Permit {
    // Field drop runs after `Drop::drop`, so counters settle before the
    // semaphore slot frees up.
    _permit: OwnedSemaphorePermit,
    counters: Arc<PermitCounters>,
}

impl Permit {
    /// Return the permit to its pool
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Permit")
    }
}

/// Whether cancellation cut the input short
///
/// Set only when input was left unread or admitted documents were discarded.
/// A cancel that arrives after the source is exhausted leaves it clear.
#[derive(Debug, Clone, Default)]
pub struct Interruption(Arc<AtomicBool>);

impl Interruption {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A document admitted into the pipeline
#[derive(Debug)]
pub struct FeedItem {
    /// Zero-based read position
    pub sequence: u64,
    pub name: String,
    pub payload: Payload,
    pub permit: Permit,
}

/// Reader-thread side: acquires a permit per record and forwards it
struct FeedProducer {
    permits: PermitPool,
    cancel: CancellationToken,
    tx: mpsc::Sender<Result<FeedItem>>,
    interruption: Interruption,
    pending: Option<Permit>,
    sequence: u64,
}

impl FeedProducer {
    fn run(mut self, source: Box<dyn DocumentSource>) {
        let label = source.describe();
        debug!(source = %label, "Reader thread started");

        match source.read_records(&mut self) {
            Ok(()) => {
                info!(source = %label, records = self.sequence, "Finished reading input");
            }
            Err(e) => {
                error!(source = %label, error = %e, "Input read failed");
                let _ = self.tx.blocking_send(Err(Error::Source(e)));
            }
        }
    }
}

impl RecordSink for FeedProducer {
    fn admit(&mut self) -> ControlFlow<()> {
        if self.pending.is_some() {
            return ControlFlow::Continue(());
        }
        if self.cancel.is_cancelled() {
            self.interruption.mark();
            return ControlFlow::Break(());
        }

        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        let permit = futures::executor::block_on(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.acquire() => permit,
            }
        });

        match permit {
            Some(permit) => {
                self.pending = Some(permit);
                ControlFlow::Continue(())
            }
            None => {
                debug!(sequence = self.sequence, "Admission stopped");
                self.interruption.mark();
                ControlFlow::Break(())
            }
        }
    }

    fn accept(&mut self, record: SourceRecord) -> ControlFlow<()> {
        if self.admit().is_break() {
            return ControlFlow::Break(());
        }
        let Some(permit) = self.pending.take() else {
            return ControlFlow::Break(());
        };

        let SourceRecord { name, payload } = record;
        trace!(sequence = self.sequence, name = %name, bytes = payload.len(), "Record admitted");

        let item = FeedItem {
            sequence: self.sequence,
            name,
            payload,
            permit,
        };
        self.sequence += 1;

        // Fails only when the consumer has gone away
        match self.tx.blocking_send(Ok(item)) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

/// Permit-bounded stream of source documents
pub struct BoundedSourceFeed {
    rx: mpsc::Receiver<Result<FeedItem>>,
    permits: PermitPool,
    cancel: CancellationToken,
    interruption: Interruption,
    finished: bool,
}

impl BoundedSourceFeed {
    /// Start the reader thread for `source`
    pub fn spawn(
        source: Box<dyn DocumentSource>,
        permits: PermitPool,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(permits.capacity().min(FEED_CHANNEL_LIMIT));
        let panic_tx = tx.clone();
        let interruption = Interruption::default();

        let producer = FeedProducer {
            permits: permits.clone(),
            cancel: cancel.clone(),
            tx,
            interruption: interruption.clone(),
            pending: None,
            sequence: 0,
        };

        std::thread::Builder::new()
            .name("midiforge-reader".to_string())
            .spawn(move || {
                if std::panic::catch_unwind(AssertUnwindSafe(move || producer.run(source))).is_err()
                {
                    let _ = panic_tx
                        .blocking_send(Err(Error::Worker("input reader thread panicked".to_string())));
                }
            })?;

        Ok(Self {
            rx,
            permits,
            cancel,
            interruption,
            finished: false,
        })
    }

    /// Next admitted document, or `None` at end of stream
    ///
    /// Suspends while the reader is blocked on capacity. A read error is
    /// returned once, after which the feed reports end of stream.
    pub async fn next(&mut self) -> Result<Option<FeedItem>> {
        if self.finished {
            return Ok(None);
        }

        let received = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                // Disconnected and empty: the reader already delivered everything
                if !matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected)) {
                    self.interruption.mark();
                }
                self.shut_down();
                return Ok(None);
            }
            received = self.rx.recv() => received,
        };

        match received {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => {
                self.shut_down();
                Err(e)
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    /// Permit pool shared with the reader
    pub fn permits(&self) -> &PermitPool {
        &self.permits
    }

    /// Handle that reports whether cancellation cut the input short
    ///
    /// Stays valid after the feed is consumed by [`into_stream`](Self::into_stream).
    pub fn interruption(&self) -> Interruption {
        self.interruption.clone()
    }

    /// Consume the feed as a stream of documents
    pub fn into_stream(self) -> impl Stream<Item = Result<FeedItem>> + Send {
        futures::stream::unfold(self, |mut feed| async move {
            match feed.next().await {
                Ok(Some(item)) => Some((Ok(item), feed)),
                Ok(None) => None,
                Err(e) => Some((Err(e), feed)),
            }
        })
    }

    // Stop the reader and return permits held by queued items
    fn shut_down(&mut self) {
        self.finished = true;
        self.rx.close();
        let mut dropped = 0usize;
        while let Ok(item) = self.rx.try_recv() {
            drop(item);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded queued documents on shutdown");
        }
    }
}
