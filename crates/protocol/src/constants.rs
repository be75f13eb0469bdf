use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol revision spoken by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default TCP port a storage node listens on.
pub const DEFAULT_NODE_PORT: u16 = 5500;

/// Maximum encoded size of a JSON frame header (64 KiB).
pub const MAX_HEADER_SIZE: usize = 64 * 1024;

/// Maximum size of a frame body (64 MiB).
///
/// Bounds the largest segment a node accepts in a single frame.
pub const MAX_PAYLOAD_SIZE: u64 = 64 * 1024 * 1024;

/// Longest accepted bucket name in bytes.
pub const MAX_BUCKET_NAME_LEN: usize = 255;

/// Checks a bucket name: non-empty, at most [`MAX_BUCKET_NAME_LEN`] bytes,
/// without `/` or control characters. Returns the reason on rejection.
pub fn check_bucket_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("bucket name is empty".into());
    }
    if name.len() > MAX_BUCKET_NAME_LEN {
        return Err(format!("bucket name exceeds {MAX_BUCKET_NAME_LEN} bytes"));
    }
    if let Some(c) = name.chars().find(|c| *c == '/' || c.is_control()) {
        return Err(format!("invalid character {c:?} in bucket name: {name:?}"));
    }
    Ok(())
}

/// Time allowed to establish a TCP connection to a node.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a single request/response round trip.
///
/// Segment frames can be tens of megabytes, so this is generous.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Error code: the request was malformed or violated a constraint.
pub const CODE_INVALID: i32 = 400;

/// Error code: the bucket, object or upload does not exist.
pub const CODE_NOT_FOUND: i32 = 404;

/// Error code: the bucket already exists.
pub const CODE_ALREADY_EXISTS: i32 = 409;

/// Error code: the node failed internally.
pub const CODE_INTERNAL: i32 = 500;

/// Message type identifier carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // Liveness
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,

    // Buckets
    #[serde(rename = "create_bucket")]
    CreateBucket,
    #[serde(rename = "bucket_created")]
    BucketCreated,

    // Object metadata
    #[serde(rename = "object_info")]
    ObjectInfo,
    #[serde(rename = "object_info_response")]
    ObjectInfoResponse,

    // Upload
    #[serde(rename = "begin_upload")]
    BeginUpload,
    #[serde(rename = "upload_started")]
    UploadStarted,
    #[serde(rename = "put_segment")]
    PutSegment,
    #[serde(rename = "segment_stored")]
    SegmentStored,
    #[serde(rename = "commit_upload")]
    CommitUpload,
    #[serde(rename = "upload_committed")]
    UploadCommitted,

    // Download
    #[serde(rename = "get_segment")]
    GetSegment,
    #[serde(rename = "segment_data")]
    SegmentData,

    // Errors
    #[serde(rename = "error")]
    Error,
}

impl MessageType {
    /// Returns the response type a node answers this request with.
    ///
    /// `None` for types that are themselves responses.
    pub fn reply_type(self) -> Option<MessageType> {
        match self {
            MessageType::Ping => Some(MessageType::Pong),
            MessageType::CreateBucket => Some(MessageType::BucketCreated),
            MessageType::ObjectInfo => Some(MessageType::ObjectInfoResponse),
            MessageType::BeginUpload => Some(MessageType::UploadStarted),
            MessageType::PutSegment => Some(MessageType::SegmentStored),
            MessageType::CommitUpload => Some(MessageType::UploadCommitted),
            MessageType::GetSegment => Some(MessageType::SegmentData),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_snake_case() {
        let json = serde_json::to_string(&MessageType::BeginUpload).unwrap();
        assert_eq!(json, "\"begin_upload\"");

        let parsed: MessageType = serde_json::from_str("\"segment_data\"").unwrap();
        assert_eq!(parsed, MessageType::SegmentData);
    }

    #[test]
    fn requests_have_reply_types() {
        assert_eq!(MessageType::Ping.reply_type(), Some(MessageType::Pong));
        assert_eq!(
            MessageType::PutSegment.reply_type(),
            Some(MessageType::SegmentStored)
        );
        assert_eq!(MessageType::Pong.reply_type(), None);
        assert_eq!(MessageType::Error.reply_type(), None);
    }
}
