//! Chunked transfer engine.
//!
//! A file is split into a [`SegmentPlan`]; the [`TransferScheduler`] drives
//! segment transfers concurrently under a fixed limit and stops everything on
//! the first failure. Uploads read their payloads through a single
//! [`SegmentReader`]; downloads write through a [`Reassembler`] that restores
//! index order.

pub mod checksum;
pub mod progress;
pub mod reader;
pub mod reassembler;
pub mod scheduler;
pub mod segment;

pub use checksum::{checksum_bytes, verify_checksum};
pub use progress::{ProgressTracker, TransferProgress};
pub use reader::SegmentReader;
pub use reassembler::{ReassemblyStats, Reassembler};
pub use scheduler::{
    FailureSignal, SegmentProducer, SegmentTracker, TransferScheduler, TransferStats,
};
pub use segment::{Segment, SegmentIter, SegmentPlan, SegmentStatus, plan};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Boxed cause of a failed segment transfer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by the transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("segment {index} failed: {source}")]
    Segment {
        index: u64,
        #[source]
        source: BoxError,
    },

    #[error("source ended early in segment {index}: read {read} of {expected} bytes")]
    SourceTruncated {
        index: u64,
        expected: u64,
        read: u64,
    },

    #[error("segment {index} is {actual} bytes, expected {expected}")]
    LengthMismatch {
        index: u64,
        expected: u64,
        actual: u64,
    },

    #[error("segment {index} checksum mismatch")]
    ChecksumMismatch { index: u64 },

    #[error("segment {index} received twice")]
    DuplicateSegment { index: u64 },

    #[error("segment {index} is outside a plan of {count} segments")]
    UnexpectedSegment { index: u64, count: u64 },

    #[error("transfer incomplete: {written} of {expected} segments written")]
    Incomplete { written: u64, expected: u64 },

    #[error("file checksum mismatch: expected {expected}, got {actual}")]
    FileChecksumMismatch { expected: String, actual: String },

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Wraps the cause of a failed segment transfer.
    pub fn segment(index: u64, source: impl Into<BoxError>) -> Self {
        TransferError::Segment {
            index,
            source: source.into(),
        }
    }

    /// Returns `true` for length, checksum, ordering and completeness errors.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            TransferError::LengthMismatch { .. }
                | TransferError::ChecksumMismatch { .. }
                | TransferError::DuplicateSegment { .. }
                | TransferError::UnexpectedSegment { .. }
                | TransferError::Incomplete { .. }
                | TransferError::FileChecksumMismatch { .. }
        )
    }

    /// Segment the error refers to, if any.
    pub fn segment_index(&self) -> Option<u64> {
        match self {
            TransferError::Segment { index, .. }
            | TransferError::SourceTruncated { index, .. }
            | TransferError::LengthMismatch { index, .. }
            | TransferError::ChecksumMismatch { index }
            | TransferError::DuplicateSegment { index }
            | TransferError::UnexpectedSegment { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = TransferError::segment(2, io);
        assert_eq!(err.segment_index(), Some(2));
        assert!(err.to_string().contains("segment 2"));

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset");
    }

    #[test]
    fn integrity_classification() {
        assert!(TransferError::ChecksumMismatch { index: 0 }.is_integrity());
        assert!(
            TransferError::Incomplete {
                written: 1,
                expected: 2
            }
            .is_integrity()
        );
        assert!(!TransferError::Cancelled.is_integrity());
        assert!(!TransferError::segment(0, "boom").is_integrity());
    }
}
