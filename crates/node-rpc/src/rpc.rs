//! Operations a storage node exposes to the transfer engine.

use futures_util::future::BoxFuture;
use silo_connection::Connection;
use silo_protocol::{
    BeginUploadRequest, BucketInfo, CommitUploadRequest, ObjectInfo, Pong, SegmentStored,
};

use crate::error::RpcError;

/// Segment bytes returned by [`NodeRpc::fetch_segment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSegment {
    pub index: u64,
    pub data: Vec<u8>,
    /// SHA-256 hex digest the node reported for `data`.
    pub checksum: String,
}

/// Request/response calls against one node connection.
///
/// Each call is a single round trip. A connection is used by one caller at a
/// time, which the `&mut self` receivers enforce.
pub trait NodeRpc: Connection {
    /// Checks the node is alive and speaks a compatible protocol.
    fn ping(&mut self) -> BoxFuture<'_, Result<Pong, RpcError>>;

    fn create_bucket<'a>(
        &'a mut self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<BucketInfo, RpcError>>;

    /// Returns metadata of a committed object, or [`RpcError::NotFound`].
    fn object_info<'a>(
        &'a mut self,
        bucket: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ObjectInfo, RpcError>>;

    /// Opens an upload and returns its transfer id.
    fn begin_upload<'a>(
        &'a mut self,
        request: &'a BeginUploadRequest,
    ) -> BoxFuture<'a, Result<String, RpcError>>;

    /// Stores one segment of an open upload.
    fn send_segment<'a>(
        &'a mut self,
        transfer_id: &'a str,
        index: u64,
        payload: &'a [u8],
        checksum: &'a str,
    ) -> BoxFuture<'a, Result<SegmentStored, RpcError>>;

    /// Publishes an upload after all of its segments are stored.
    fn commit_upload<'a>(
        &'a mut self,
        request: &'a CommitUploadRequest,
    ) -> BoxFuture<'a, Result<ObjectInfo, RpcError>>;

    /// Reads one segment of a committed object.
    fn fetch_segment<'a>(
        &'a mut self,
        bucket: &'a str,
        name: &'a str,
        index: u64,
    ) -> BoxFuture<'a, Result<FetchedSegment, RpcError>>;
}
