//! Segment planning.

use crate::TransferError;

/// One contiguous byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    /// 0-based sequence index.
    pub index: u64,
    /// Byte offset in the file.
    pub offset: u64,
    /// Length in bytes. Equal to the chunk size except possibly for the last segment.
    pub len: u64,
}

impl Segment {
    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Lifecycle of a segment within one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SegmentStatus {
    #[default]
    Pending,
    InFlight,
    Done,
    Failed,
}

/// Partition of `[0, total_size)` into fixed-size segments.
///
/// Segment `i` covers `[i * chunk_size, min((i + 1) * chunk_size, total_size))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPlan {
    total_size: u64,
    chunk_size: u64,
    count: u64,
}

/// Plans the segments of a `total_size` byte file.
pub fn plan(total_size: u64, chunk_size: u64) -> Result<SegmentPlan, TransferError> {
    SegmentPlan::new(total_size, chunk_size)
}

impl SegmentPlan {
    pub fn new(total_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::Config("chunk size must be greater than 0".into()));
        }
        Ok(Self {
            total_size,
            chunk_size,
            count: total_size.div_ceil(chunk_size),
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of segments.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns segment `index`, or `None` past the end.
    pub fn segment(&self, index: u64) -> Option<Segment> {
        if index >= self.count {
            return None;
        }
        let offset = index * self.chunk_size;
        Some(Segment {
            index,
            offset,
            len: self.chunk_size.min(self.total_size - offset),
        })
    }

    /// Iterates segments in ascending index order.
    pub fn iter(&self) -> SegmentIter {
        SegmentIter {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &SegmentPlan {
    type Item = Segment;
    type IntoIter = SegmentIter;

    fn into_iter(self) -> SegmentIter {
        self.iter()
    }
}

/// Iterator over the segments of a [`SegmentPlan`].
#[derive(Debug, Clone)]
pub struct SegmentIter {
    plan: SegmentPlan,
    next: u64,
}

impl SegmentIter {
    pub fn plan(&self) -> &SegmentPlan {
        &self.plan
    }
}

impl Iterator for SegmentIter {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let segment = self.plan.segment(self.next)?;
        self.next += 1;
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.plan.count - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SegmentIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_has_no_segments() {
        let plan = plan(0, 1024).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.iter().count(), 0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(plan(10, 0), Err(TransferError::Config(_))));
    }

    #[test]
    fn exact_multiple() {
        let plan = plan(5 * 1024, 1024).unwrap();
        assert_eq!(plan.len(), 5);
        assert!(plan.iter().all(|s| s.len == 1024));
    }

    #[test]
    fn single_chunk_file() {
        let plan = plan(5_000_000, 5_000_000).unwrap();
        let segments: Vec<_> = plan.iter().collect();
        assert_eq!(
            segments,
            vec![Segment {
                index: 0,
                offset: 0,
                len: 5_000_000
            }]
        );
    }

    #[test]
    fn short_last_segment() {
        let chunk = 1000;
        let plan = plan(chunk * 3 + 7, chunk).unwrap();
        let segments: Vec<_> = plan.iter().collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[3].offset, 3000);
        assert_eq!(segments[3].len, 7);
        assert!(plan.segment(4).is_none());
    }

    #[test]
    fn segments_partition_the_file() {
        for total in [1u64, 2, 7, 63, 64, 65, 1000, 4097] {
            for chunk in [1u64, 3, 64, 4096] {
                let plan = plan(total, chunk).unwrap();
                let mut cursor = 0;
                for (i, segment) in plan.iter().enumerate() {
                    assert_eq!(segment.index, i as u64);
                    assert_eq!(segment.offset, cursor);
                    assert!(segment.len > 0 && segment.len <= chunk);
                    cursor = segment.end();
                }
                assert_eq!(cursor, total, "total={total} chunk={chunk}");
            }
        }
    }

    #[test]
    fn iterator_is_exact_size() {
        let plan = plan(10, 3).unwrap();
        let mut iter = plan.iter();
        assert_eq!(iter.len(), 4);
        iter.next();
        assert_eq!(iter.len(), 3);
    }
}
