//! Wire protocol types shared by the Silo SDK and storage nodes.
//!
//! Every request and response travels as a [`Message`] envelope (JSON
//! header) optionally followed by a raw binary body carrying segment bytes.
//! Framing lives in `silo-node-rpc`; this crate only defines the shapes.

pub mod constants;
pub mod envelope;
pub mod messages;

pub use constants::MessageType;
pub use envelope::{ErrorBody, Message};
pub use messages::{
    BeginUploadRequest, BucketInfo, CommitUploadRequest, CreateBucketRequest, GetSegmentRequest,
    ObjectInfo, ObjectInfoRequest, Pong, PutSegmentRequest, SegmentData, SegmentStored,
    UploadStarted,
};
