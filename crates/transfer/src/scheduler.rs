//! Bounded concurrent segment scheduling with first-failure cancellation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::AsyncRead;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::reader::SegmentReader;
use crate::segment::{Segment, SegmentIter, SegmentStatus};
use crate::TransferError;

/// Source of segments for a scheduler run.
///
/// Segments must come out in ascending index order. The scheduler calls
/// [`next_segment`](Self::next_segment) from a single task, only after a
/// worker slot is free.
pub trait SegmentProducer: Send {
    /// Data handed to the worker along with the segment.
    type Item: Send + 'static;

    fn next_segment(
        &mut self,
    ) -> impl Future<Output = Result<Option<(Segment, Self::Item)>, TransferError>> + Send;

    /// Number of segments the producer yields in total.
    fn total_segments(&self) -> u64;
}

impl SegmentProducer for SegmentIter {
    type Item = ();

    async fn next_segment(&mut self) -> Result<Option<(Segment, ())>, TransferError> {
        Ok(self.next().map(|s| (s, ())))
    }

    fn total_segments(&self) -> u64 {
        self.plan().len()
    }
}

impl<R: AsyncRead + Unpin + Send> SegmentProducer for SegmentReader<R> {
    type Item = Vec<u8>;

    async fn next_segment(&mut self) -> Result<Option<(Segment, Vec<u8>)>, TransferError> {
        self.read_next().await
    }

    fn total_segments(&self) -> u64 {
        SegmentReader::total_segments(self)
    }
}

/// Records the first error of a run and cancels it.
///
/// Later errors are dropped. When failures race, whichever wins the atomic
/// guard is reported.
#[derive(Clone)]
pub struct FailureSignal {
    inner: Arc<FailureInner>,
}

struct FailureInner {
    failed: AtomicBool,
    first: Mutex<Option<TransferError>>,
    cancel: CancellationToken,
}

impl FailureSignal {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(FailureInner {
                failed: AtomicBool::new(false),
                first: Mutex::new(None),
                cancel,
            }),
        }
    }

    /// Fails the run with `err` unless it already failed.
    ///
    /// Returns `true` if `err` became the run's error.
    pub fn fail(&self, err: TransferError) -> bool {
        if self.inner.failed.swap(true, Ordering::SeqCst) {
            trace!(error = %err, "dropping later failure");
            return false;
        }
        *self
            .inner
            .first
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(err);
        self.inner.cancel.cancel();
        true
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    /// Token cancelled on failure (or by the scheduler's parent token).
    pub fn token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Removes the recorded error, if any.
    ///
    /// [`TransferScheduler::run`] takes it when the run ends; collaborators
    /// that fail after the run returned take their own error here.
    pub fn take_error(&self) -> Option<TransferError> {
        self.inner
            .first
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// Per-segment status and in-flight accounting for one run.
pub struct SegmentTracker {
    statuses: Mutex<Vec<SegmentStatus>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    started: AtomicU64,
    completed: AtomicU64,
    bytes: AtomicU64,
}

impl SegmentTracker {
    pub fn new(total_segments: u64) -> Self {
        Self {
            statuses: Mutex::new(vec![SegmentStatus::Pending; total_segments as usize]),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            started: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    fn set(&self, index: u64, status: SegmentStatus) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = statuses.get_mut(index as usize) {
            *slot = status;
        }
    }

    fn start(&self, index: u64) {
        self.set(index, SegmentStatus::InFlight);
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn finish(&self, index: u64, bytes: u64) {
        self.set(index, SegmentStatus::Done);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(bytes, Ordering::SeqCst);
    }

    fn fail(&self, index: u64) {
        self.set(index, SegmentStatus::Failed);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn status(&self, index: u64) -> Option<SegmentStatus> {
        self.statuses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index as usize)
            .copied()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Segments handed to a worker so far.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub segments: u64,
    pub bytes: u64,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

/// Runs segment transfers with at most `concurrency` in flight.
///
/// A scheduler drives a single run. The first failing segment (or a failure
/// reported through [`failure_signal`](Self::failure_signal)) cancels every
/// other segment; [`run`](Self::run) returns that error once all started
/// workers have finished.
pub struct TransferScheduler {
    concurrency: usize,
    failure: FailureSignal,
    tracker: Mutex<Option<Arc<SegmentTracker>>>,
}

impl TransferScheduler {
    pub fn new(concurrency: usize) -> Result<Self, TransferError> {
        Self::with_parent(concurrency, &CancellationToken::new())
    }

    /// Creates a scheduler whose run is also cancelled when `parent` is.
    pub fn with_parent(
        concurrency: usize,
        parent: &CancellationToken,
    ) -> Result<Self, TransferError> {
        if concurrency == 0 {
            return Err(TransferError::Config(
                "concurrency must be greater than 0".into(),
            ));
        }
        Ok(Self {
            concurrency,
            failure: FailureSignal::new(parent.child_token()),
            tracker: Mutex::new(None),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Handle for collaborators that need to abort the run.
    pub fn failure_signal(&self) -> FailureSignal {
        self.failure.clone()
    }

    /// Tracker of the current or last run.
    pub fn tracker(&self) -> Option<Arc<SegmentTracker>> {
        self.tracker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Transfers every segment of `producer` through `transfer_fn`.
    ///
    /// `transfer_fn` returns the number of bytes moved for the segment. Its
    /// future runs on its own task and is dropped if the run is cancelled.
    pub async fn run<P, F, Fut>(
        &self,
        producer: &mut P,
        mut transfer_fn: F,
    ) -> Result<TransferStats, TransferError>
    where
        P: SegmentProducer,
        F: FnMut(Segment, P::Item) -> Fut + Send,
        Fut: Future<Output = Result<u64, TransferError>> + Send + 'static,
    {
        let started = Instant::now();
        let total = producer.total_segments();
        let tracker = Arc::new(SegmentTracker::new(total));
        *self.tracker.lock().unwrap_or_else(|e| e.into_inner()) = Some(tracker.clone());

        let token = self.failure.token().clone();
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();

        debug!(segments = total, concurrency = self.concurrency, "transfer run started");

        loop {
            while let Some(joined) = workers.try_join_next() {
                self.reap(joined);
            }

            // A slot is taken before the producer reads, so payloads held in
            // memory never exceed the concurrency limit.
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = producer.next_segment() => next,
            };
            let (segment, item) = match next {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "segment producer failed");
                    self.failure.fail(e);
                    break;
                }
            };

            tracker.start(segment.index);
            trace!(index = segment.index, len = segment.len, "segment dispatched");
            let work = transfer_fn(segment, item);
            let token = token.clone();
            let tracker = tracker.clone();
            let failure = self.failure.clone();

            workers.spawn(async move {
                let _permit = permit;
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(TransferError::Cancelled),
                    result = work => result,
                };
                match result {
                    Ok(bytes) => {
                        tracker.finish(segment.index, bytes);
                        trace!(index = segment.index, bytes, "segment done");
                    }
                    Err(e) => {
                        tracker.fail(segment.index);
                        if !e.is_cancelled() {
                            warn!(index = segment.index, error = %e, "segment failed");
                            failure.fail(e);
                        }
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            self.reap(joined);
        }

        if let Some(err) = self.failure.take_error() {
            debug!(
                completed = tracker.completed(),
                started = tracker.started(),
                "transfer run failed"
            );
            return Err(err);
        }
        if token.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let stats = TransferStats {
            segments: tracker.completed(),
            bytes: tracker.bytes(),
            peak_in_flight: tracker.peak_in_flight(),
            elapsed: started.elapsed(),
        };
        debug!(
            segments = stats.segments,
            bytes = stats.bytes,
            peak_in_flight = stats.peak_in_flight,
            "transfer run finished"
        );
        Ok(stats)
    }

    fn reap(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            self.failure.fail(TransferError::Worker(e.to_string()));
        }
    }
}
