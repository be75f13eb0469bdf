use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Span of recent samples the reported speed is averaged over.
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// Snapshot of a transfer's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub total_segments: u64,
    pub completed_segments: u64,
    pub bytes_per_second: f64,
    /// Time left at the current rate; unknown until the rate is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<Duration>,
}

impl TransferProgress {
    /// Completion percentage (0.0..=100.0). An empty transfer counts as done.
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        self.transferred_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}

/// Counts completed segments of one transfer and derives its speed.
///
/// Safe to update from every worker of the transfer.
pub struct ProgressTracker {
    total_bytes: u64,
    total_segments: u64,
    transferred: AtomicU64,
    completed: AtomicU64,
    speed: RateWindow,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64, total_segments: u64) -> Self {
        Self {
            total_bytes,
            total_segments,
            transferred: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            speed: RateWindow::new(RATE_WINDOW),
        }
    }

    /// Records one completed segment and returns the updated snapshot.
    pub fn record(&self, bytes: u64) -> TransferProgress {
        self.transferred.fetch_add(bytes, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.speed.add_sample(bytes);
        self.snapshot()
    }

    pub fn snapshot(&self) -> TransferProgress {
        let transferred_bytes = self.transferred.load(Ordering::SeqCst);
        let bytes_per_second = self.speed.bytes_per_second();
        let remaining = self.total_bytes.saturating_sub(transferred_bytes);
        TransferProgress {
            total_bytes: self.total_bytes,
            transferred_bytes,
            total_segments: self.total_segments,
            completed_segments: self.completed.load(Ordering::SeqCst),
            bytes_per_second,
            eta: (bytes_per_second > 0.0)
                .then(|| Duration::from_secs_f64(remaining as f64 / bytes_per_second)),
        }
    }
}

/// Throughput over the most recent `window` of samples.
struct RateWindow {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Records `bytes` moved now and forgets samples older than the window.
    fn add_sample(&self, bytes: u64) {
        let now = Instant::now();
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.push_back((now, bytes));
        while let Some(&(at, _)) = samples.front() {
            if now.duration_since(at) <= self.window {
                break;
            }
            samples.pop_front();
        }
    }

    /// Bytes per second between the oldest and newest sample; 0.0 until
    /// two samples at distinct instants exist.
    fn bytes_per_second(&self) -> f64 {
        let samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(&(first, _)), Some(&(last, _))) = (samples.front(), samples.back()) else {
            return 0.0;
        };
        let span = last.duration_since(first);
        if span.is_zero() {
            return 0.0;
        }
        let bytes: u64 = samples.iter().map(|&(_, b)| b).sum();
        bytes as f64 / span.as_secs_f64()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
