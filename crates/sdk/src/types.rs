//! Transfer handles, results and events.

use std::fmt;
use std::time::Duration;

use silo_protocol::ObjectInfo;
use silo_transfer::TransferProgress;

/// Direction of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// Event emitted while transfers run.
///
/// Events are sent without blocking; if the receiver falls behind, events
/// are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Started {
        direction: Direction,
        bucket: String,
        name: String,
        size: u64,
        segments: u64,
    },
    SegmentCompleted {
        direction: Direction,
        bucket: String,
        name: String,
        index: u64,
        progress: TransferProgress,
    },
    Completed {
        direction: Direction,
        bucket: String,
        name: String,
        bytes: u64,
    },
    Failed {
        direction: Direction,
        bucket: String,
        name: String,
        error: String,
    },
}

/// A validated upload waiting to run. Created by
/// [`Sdk::create_file_upload`](crate::Sdk::create_file_upload).
#[derive(Debug)]
pub struct FileUpload<R> {
    pub(crate) bucket: String,
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) reader: R,
}

impl<R> FileUpload<R> {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// A remote object ready to download. Created by
/// [`Sdk::create_file_download`](crate::Sdk::create_file_download).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDownload {
    pub(crate) info: ObjectInfo,
}

impl FileDownload {
    pub fn bucket(&self) -> &str {
        &self.info.bucket
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    /// Segment size the object was uploaded with. Downloads use the same.
    pub fn chunk_size(&self) -> u64 {
        self.info.chunk_size
    }

    pub fn segment_count(&self) -> u64 {
        self.info.segment_count
    }

    /// Hex SHA-256 of the object, empty if the node did not report one.
    pub fn checksum(&self) -> &str {
        &self.info.checksum
    }

    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub object: ObjectInfo,
    pub transfer_id: String,
    pub segments: u64,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

/// Outcome of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    pub bytes: u64,
    pub segments: u64,
    pub checksum: String,
    pub peak_in_flight: usize,
    /// Most segments buffered at once waiting for an earlier segment.
    pub peak_pending: usize,
    pub elapsed: Duration,
}
