//! Single-producer slicing of an upload source.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::segment::{Segment, SegmentIter, SegmentPlan};
use crate::TransferError;

/// Reads the segments of a plan from one source, in order.
///
/// Each call returns exactly one segment's bytes. Bytes past the planned
/// size are never read. The reader keeps a running SHA-256 of everything it
/// returned, which equals the whole-file digest once all segments are read.
pub struct SegmentReader<R> {
    source: R,
    segments: SegmentIter,
    hasher: Sha256,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin + Send> SegmentReader<R> {
    pub fn new(source: R, plan: &SegmentPlan) -> Self {
        Self {
            source,
            segments: plan.iter(),
            hasher: Sha256::new(),
            bytes_read: 0,
        }
    }

    /// Reads the next segment. Returns `None` once the plan is exhausted.
    pub async fn read_next(&mut self) -> Result<Option<(Segment, Vec<u8>)>, TransferError> {
        let Some(segment) = self.segments.next() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; segment.len as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.source.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(TransferError::SourceTruncated {
                    index: segment.index,
                    expected: segment.len,
                    read: filled as u64,
                });
            }
            filled += n;
        }

        self.hasher.update(&buf);
        self.bytes_read += segment.len;
        Ok(Some((segment, buf)))
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn total_segments(&self) -> u64 {
        self.segments.plan().len()
    }

    /// Hex SHA-256 of the bytes returned so far.
    pub fn checksum(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_bytes;

    #[tokio::test]
    async fn reads_segments_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let plan = SegmentPlan::new(data.len() as u64, 300).unwrap();
        let mut reader = SegmentReader::new(&data[..], &plan);

        let mut rebuilt = Vec::new();
        let mut indices = Vec::new();
        while let Some((segment, bytes)) = reader.read_next().await.unwrap() {
            assert_eq!(bytes.len() as u64, segment.len);
            indices.push(segment.index);
            rebuilt.extend_from_slice(&bytes);
        }

        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(rebuilt, data);
        assert_eq!(reader.bytes_read(), 1000);
        assert_eq!(reader.checksum(), checksum_bytes(&data));
    }

    #[tokio::test]
    async fn truncated_source_names_segment() {
        let data = vec![7u8; 250];
        let plan = SegmentPlan::new(400, 100).unwrap();
        let mut reader = SegmentReader::new(&data[..], &plan);

        reader.read_next().await.unwrap().unwrap();
        reader.read_next().await.unwrap().unwrap();
        let err = reader.read_next().await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::SourceTruncated {
                index: 2,
                expected: 100,
                read: 50
            }
        ));
    }

    #[tokio::test]
    async fn ignores_bytes_past_declared_size() {
        let data = b"0123456789trailing".to_vec();
        let plan = SegmentPlan::new(10, 4).unwrap();
        let mut reader = SegmentReader::new(&data[..], &plan);

        let mut rebuilt = Vec::new();
        while let Some((_, bytes)) = reader.read_next().await.unwrap() {
            rebuilt.extend_from_slice(&bytes);
        }
        assert_eq!(rebuilt, b"0123456789");
    }

    #[tokio::test]
    async fn empty_plan_reads_nothing() {
        let plan = SegmentPlan::new(0, 4).unwrap();
        let mut reader = SegmentReader::new(&b"ignored"[..], &plan);
        assert!(reader.read_next().await.unwrap().is_none());
        assert_eq!(reader.checksum(), checksum_bytes(b""));
    }
}
