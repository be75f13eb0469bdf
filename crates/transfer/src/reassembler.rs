//! In-order reassembly of downloaded segments.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::segment::SegmentPlan;
use crate::TransferError;

/// Totals reported by [`Reassembler::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub bytes_written: u64,
    /// Hex SHA-256 of everything written.
    pub checksum: String,
    /// Most segments held at once while waiting for a gap to fill.
    pub peak_pending: usize,
}

/// Writes segments that arrive in any order to `writer` in index order.
///
/// Segments ahead of the write cursor wait in a map keyed by index. Whenever
/// the next expected segment arrives, it and every contiguous pending
/// segment after it are written.
pub struct Reassembler<W> {
    writer: W,
    plan: SegmentPlan,
    next_index: u64,
    pending: BTreeMap<u64, Vec<u8>>,
    pending_bytes: u64,
    peak_pending: usize,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> Reassembler<W> {
    pub fn new(writer: W, plan: SegmentPlan) -> Self {
        Self {
            writer,
            plan,
            next_index: 0,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            peak_pending: 0,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Accepts the payload of segment `index`.
    pub async fn accept(&mut self, index: u64, payload: Vec<u8>) -> Result<(), TransferError> {
        let segment = self
            .plan
            .segment(index)
            .ok_or(TransferError::UnexpectedSegment {
                index,
                count: self.plan.len(),
            })?;
        if payload.len() as u64 != segment.len {
            return Err(TransferError::LengthMismatch {
                index,
                expected: segment.len,
                actual: payload.len() as u64,
            });
        }
        if index < self.next_index || self.pending.contains_key(&index) {
            return Err(TransferError::DuplicateSegment { index });
        }

        if index != self.next_index {
            trace!(index, cursor = self.next_index, "segment held until gap fills");
            self.pending_bytes += payload.len() as u64;
            self.pending.insert(index, payload);
            self.peak_pending = self.peak_pending.max(self.pending.len());
            return Ok(());
        }

        self.write(payload).await?;
        while let Some(next) = self.pending.remove(&self.next_index) {
            self.pending_bytes -= next.len() as u64;
            self.write(next).await?;
        }
        Ok(())
    }

    async fn write(&mut self, payload: Vec<u8>) -> Result<(), TransferError> {
        self.writer.write_all(&payload).await?;
        self.hasher.update(&payload);
        self.bytes_written += payload.len() as u64;
        self.next_index += 1;
        Ok(())
    }

    /// Index of the next segment to be written.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Number of segments waiting for an earlier one.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes the writer and checks every segment was written.
    ///
    /// When `expected_checksum` is non-empty, the SHA-256 of the written
    /// bytes must match it.
    pub async fn finish(
        mut self,
        expected_checksum: Option<&str>,
    ) -> Result<ReassemblyStats, TransferError> {
        if self.next_index != self.plan.len() {
            return Err(TransferError::Incomplete {
                written: self.next_index,
                expected: self.plan.len(),
            });
        }
        self.writer.flush().await?;

        let checksum = hex::encode(self.hasher.finalize());
        if let Some(expected) = expected_checksum.filter(|c| !c.is_empty())
            && !expected.eq_ignore_ascii_case(&checksum)
        {
            return Err(TransferError::FileChecksumMismatch {
                expected: expected.to_string(),
                actual: checksum,
            });
        }

        Ok(ReassemblyStats {
            bytes_written: self.bytes_written,
            checksum,
            peak_pending: self.peak_pending,
        })
    }
}
