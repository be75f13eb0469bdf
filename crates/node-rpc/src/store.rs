//! In-memory object store backing [`NodeServer`](crate::server::NodeServer).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use silo_protocol::constants::{
    CODE_ALREADY_EXISTS, CODE_INTERNAL, CODE_INVALID, CODE_NOT_FOUND, MAX_PAYLOAD_SIZE,
    check_bucket_name,
};
use silo_protocol::{BeginUploadRequest, BucketInfo, CommitUploadRequest, ObjectInfo};
use tracing::{debug, info};

/// A request the store refused, with the wire error code to reply with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    pub code: i32,
    pub message: String,
}

impl StoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: CODE_INVALID,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: CODE_NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self {
            code: CODE_ALREADY_EXISTS,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: CODE_INTERNAL,
            message: message.into(),
        }
    }
}

struct StoredObject {
    info: ObjectInfo,
    data: Vec<u8>,
}

struct PendingUpload {
    bucket: String,
    name: String,
    size: u64,
    chunk_size: u64,
    segment_count: u64,
    segments: BTreeMap<u64, Vec<u8>>,
}

impl PendingUpload {
    fn segment_len(&self, index: u64) -> u64 {
        let offset = index * self.chunk_size;
        self.chunk_size.min(self.size - offset)
    }
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
}

/// Buckets, committed objects and open uploads held in memory.
#[derive(Default)]
pub struct ObjectStore {
    state: Mutex<StoreState>,
}

/// Lowercase hex SHA-256 of `data`.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn create_bucket(&self, name: &str) -> Result<BucketInfo, StoreError> {
        check_bucket_name(name).map_err(StoreError::invalid)?;
        let mut state = self.lock();
        if state.buckets.contains_key(name) {
            return Err(StoreError::already_exists(format!("bucket {name}")));
        }
        state.buckets.insert(name.to_string(), HashMap::new());
        info!(bucket = name, "bucket created");
        Ok(BucketInfo {
            name: name.to_string(),
        })
    }

    pub fn object_info(&self, bucket: &str, name: &str) -> Result<ObjectInfo, StoreError> {
        let state = self.lock();
        let objects = state
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::not_found(format!("bucket {bucket}")))?;
        objects
            .get(name)
            .map(|o| o.info.clone())
            .ok_or_else(|| StoreError::not_found(format!("object {bucket}/{name}")))
    }

    /// Opens an upload and returns its transfer id.
    pub fn begin_upload(&self, req: &BeginUploadRequest) -> Result<String, StoreError> {
        if req.name.is_empty() {
            return Err(StoreError::invalid("object name is empty"));
        }
        if req.chunk_size == 0 || req.chunk_size > MAX_PAYLOAD_SIZE {
            return Err(StoreError::invalid(format!(
                "chunk size {} outside 1..={MAX_PAYLOAD_SIZE}",
                req.chunk_size
            )));
        }

        let mut state = self.lock();
        if !state.buckets.contains_key(&req.bucket) {
            return Err(StoreError::not_found(format!("bucket {}", req.bucket)));
        }

        let transfer_id = uuid::Uuid::new_v4().to_string();
        let upload = PendingUpload {
            bucket: req.bucket.clone(),
            name: req.name.clone(),
            size: req.size,
            chunk_size: req.chunk_size,
            segment_count: req.size.div_ceil(req.chunk_size),
            segments: BTreeMap::new(),
        };
        debug!(
            transfer_id,
            bucket = %req.bucket,
            name = %req.name,
            size = req.size,
            segments = upload.segment_count,
            "upload opened"
        );
        state.uploads.insert(transfer_id.clone(), upload);
        Ok(transfer_id)
    }

    /// Stores one segment. Re-sending a segment replaces the earlier copy.
    pub fn put_segment(
        &self,
        transfer_id: &str,
        index: u64,
        checksum: &str,
        data: Vec<u8>,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock();
        let upload = state
            .uploads
            .get_mut(transfer_id)
            .ok_or_else(|| StoreError::not_found(format!("upload {transfer_id}")))?;

        if index >= upload.segment_count {
            return Err(StoreError::invalid(format!(
                "segment {index} out of range (upload has {})",
                upload.segment_count
            )));
        }
        let expected = upload.segment_len(index);
        if data.len() as u64 != expected {
            return Err(StoreError::invalid(format!(
                "segment {index} is {} bytes, expected {expected}",
                data.len()
            )));
        }
        if sha256_hex(&data) != checksum {
            return Err(StoreError::invalid(format!("segment {index} checksum mismatch")));
        }

        let len = data.len() as u64;
        upload.segments.insert(index, data);
        Ok(len)
    }

    /// Publishes an upload as an object, replacing any object of that name.
    pub fn commit_upload(&self, req: &CommitUploadRequest) -> Result<ObjectInfo, StoreError> {
        let mut state = self.lock();
        let upload = state
            .uploads
            .get(&req.transfer_id)
            .ok_or_else(|| StoreError::not_found(format!("upload {}", req.transfer_id)))?;

        if req.segment_count != upload.segment_count {
            return Err(StoreError::invalid(format!(
                "commit names {} segments, upload has {}",
                req.segment_count, upload.segment_count
            )));
        }
        if upload.segments.len() as u64 != upload.segment_count {
            return Err(StoreError::invalid(format!(
                "upload incomplete: {} of {} segments stored",
                upload.segments.len(),
                upload.segment_count
            )));
        }

        let mut data = Vec::with_capacity(upload.size as usize);
        for segment in upload.segments.values() {
            data.extend_from_slice(segment);
        }
        let checksum = sha256_hex(&data);
        if !req.checksum.is_empty() && req.checksum != checksum {
            return Err(StoreError::invalid("object checksum mismatch"));
        }

        let upload = state
            .uploads
            .remove(&req.transfer_id)
            .ok_or_else(|| StoreError::internal("upload vanished during commit"))?;
        let info = ObjectInfo {
            bucket: upload.bucket.clone(),
            name: upload.name.clone(),
            size: upload.size,
            chunk_size: upload.chunk_size,
            segment_count: upload.segment_count,
            checksum,
        };
        let objects = state
            .buckets
            .get_mut(&upload.bucket)
            .ok_or_else(|| StoreError::not_found(format!("bucket {}", upload.bucket)))?;
        objects.insert(
            upload.name,
            StoredObject {
                info: info.clone(),
                data,
            },
        );

        info!(bucket = %info.bucket, name = %info.name, size = info.size, "object committed");
        Ok(info)
    }

    /// Returns segment `index` of a committed object with its checksum.
    pub fn get_segment(
        &self,
        bucket: &str,
        name: &str,
        index: u64,
    ) -> Result<(Vec<u8>, String), StoreError> {
        let state = self.lock();
        let object = state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(name))
            .ok_or_else(|| StoreError::not_found(format!("object {bucket}/{name}")))?;

        let info = &object.info;
        if index >= info.segment_count {
            return Err(StoreError::invalid(format!(
                "segment {index} out of range (object has {})",
                info.segment_count
            )));
        }
        let start = (index * info.chunk_size) as usize;
        let end = (start + info.chunk_size as usize).min(object.data.len());
        let data = object.data[start..end].to_vec();
        let checksum = sha256_hex(&data);
        Ok((data, checksum))
    }

    /// Number of uploads opened but not yet committed.
    pub fn pending_uploads(&self) -> usize {
        self.lock().uploads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin(store: &ObjectStore, size: u64, chunk_size: u64) -> String {
        store
            .begin_upload(&BeginUploadRequest {
                bucket: "b".into(),
                name: "obj".into(),
                size,
                chunk_size,
            })
            .unwrap()
    }

    #[test]
    fn malformed_bucket_names_rejected() {
        let store = ObjectStore::new();
        for name in ["", "a/b", "tab\there"] {
            let err = store.create_bucket(name).unwrap_err();
            assert_eq!(err.code, CODE_INVALID, "{name:?}");
        }
        assert!(store.create_bucket("Mixed_Case bucket").is_ok());
    }

    #[test]
    fn duplicate_bucket_rejected() {
        let store = ObjectStore::new();
        store.create_bucket("b").unwrap();
        let err = store.create_bucket("b").unwrap_err();
        assert_eq!(err.code, CODE_ALREADY_EXISTS);
    }

    #[test]
    fn upload_commit_and_read_back() {
        let store = ObjectStore::new();
        store.create_bucket("b").unwrap();
        let id = begin(&store, 10, 4);

        let data = b"0123456789".to_vec();
        for (i, chunk) in data.chunks(4).enumerate().rev() {
            store
                .put_segment(&id, i as u64, &sha256_hex(chunk), chunk.to_vec())
                .unwrap();
        }
        let info = store
            .commit_upload(&CommitUploadRequest {
                transfer_id: id,
                segment_count: 3,
                checksum: sha256_hex(&data),
            })
            .unwrap();
        assert_eq!(info.size, 10);
        assert_eq!(info.segment_count, 3);
        assert_eq!(store.pending_uploads(), 0);

        let (last, _) = store.get_segment("b", "obj", 2).unwrap();
        assert_eq!(last, b"89");
        assert_eq!(store.object_info("b", "obj").unwrap(), info);
    }

    #[test]
    fn rejects_wrong_segment_length_and_checksum() {
        let store = ObjectStore::new();
        store.create_bucket("b").unwrap();
        let id = begin(&store, 10, 4);

        let err = store
            .put_segment(&id, 2, &sha256_hex(b"89x"), b"89x".to_vec())
            .unwrap_err();
        assert_eq!(err.code, CODE_INVALID);

        let err = store
            .put_segment(&id, 0, &sha256_hex(b"nope"), b"0123".to_vec())
            .unwrap_err();
        assert_eq!(err.code, CODE_INVALID);

        let err = store
            .put_segment(&id, 3, &sha256_hex(b""), Vec::new())
            .unwrap_err();
        assert_eq!(err.code, CODE_INVALID);
    }

    #[test]
    fn commit_requires_every_segment() {
        let store = ObjectStore::new();
        store.create_bucket("b").unwrap();
        let id = begin(&store, 8, 4);
        store
            .put_segment(&id, 0, &sha256_hex(b"0123"), b"0123".to_vec())
            .unwrap();

        let err = store
            .commit_upload(&CommitUploadRequest {
                transfer_id: id,
                segment_count: 2,
                checksum: String::new(),
            })
            .unwrap_err();
        assert_eq!(err.code, CODE_INVALID);
        assert!(store.object_info("b", "obj").is_err());
    }

    #[test]
    fn empty_object_commits_with_zero_segments() {
        let store = ObjectStore::new();
        store.create_bucket("b").unwrap();
        let id = begin(&store, 0, 4);
        let info = store
            .commit_upload(&CommitUploadRequest {
                transfer_id: id,
                segment_count: 0,
                checksum: sha256_hex(b""),
            })
            .unwrap();
        assert_eq!(info.size, 0);
        assert_eq!(info.segment_count, 0);
    }

    #[test]
    fn missing_bucket_and_object() {
        let store = ObjectStore::new();
        assert_eq!(store.object_info("b", "x").unwrap_err().code, CODE_NOT_FOUND);

        let err = store
            .begin_upload(&BeginUploadRequest {
                bucket: "nope".into(),
                name: "x".into(),
                size: 1,
                chunk_size: 1,
            })
            .unwrap_err();
        assert_eq!(err.code, CODE_NOT_FOUND);
    }
}
