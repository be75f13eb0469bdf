use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Creates a bucket on the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBucketRequest {
    pub name: String,
}

/// Looks up the metadata of a committed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfoRequest {
    pub bucket: String,
    pub name: String,
}

/// Opens an upload; segments are sent against the returned transfer id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadRequest {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    pub chunk_size: u64,
}

/// Header of a segment upload. The segment bytes travel as the frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutSegmentRequest {
    pub transfer_id: String,
    pub index: u64,
    /// SHA-256 hex digest of the frame body.
    pub checksum: String,
}

/// Publishes an upload once every segment is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitUploadRequest {
    pub transfer_id: String,
    pub segment_count: u64,
    /// SHA-256 hex digest of the whole object.
    pub checksum: String,
}

/// Fetches one segment of a committed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSegmentRequest {
    pub bucket: String,
    pub name: String,
    pub index: u64,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Reply to `ping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub protocol_version: u32,
}

/// A bucket known to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub name: String,
}

/// Metadata of a committed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub bucket: String,
    pub name: String,
    pub size: u64,
    /// Segment size the object was uploaded with.
    pub chunk_size: u64,
    pub segment_count: u64,
    /// SHA-256 hex digest of the whole object (empty if unknown).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

/// Reply to `begin_upload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStarted {
    pub transfer_id: String,
}

/// Reply to `put_segment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStored {
    pub index: u64,
    pub size: u64,
}

/// Header of a `get_segment` reply. The segment bytes travel as the frame body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentData {
    pub index: u64,
    pub checksum: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_upload_uses_camel_case() {
        let req = BeginUploadRequest {
            bucket: "b".into(),
            name: "file.bin".into(),
            size: 10,
            chunk_size: 4,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["chunkSize"], 4);
        assert_eq!(json["size"], 10);
    }

    #[test]
    fn object_info_checksum_optional() {
        let json = r#"{"bucket":"b","name":"n","size":3,"chunkSize":2,"segmentCount":2}"#;
        let info: ObjectInfo = serde_json::from_str(json).unwrap();
        assert!(info.checksum.is_empty());
        assert_eq!(info.segment_count, 2);

        let out = serde_json::to_string(&info).unwrap();
        assert!(!out.contains("checksum"));
    }
}
