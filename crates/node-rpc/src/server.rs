//! Storage node server.
//!
//! Accepts TCP connections and serves framed requests against an
//! [`ObjectStore`]. Each connection runs in its own task and handles one
//! request at a time.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use silo_protocol::constants::PROTOCOL_VERSION;
use silo_protocol::{
    BeginUploadRequest, CommitUploadRequest, CreateBucketRequest, GetSegmentRequest, Message,
    MessageType, ObjectInfoRequest, Pong, PutSegmentRequest, SegmentData, SegmentStored,
    UploadStarted,
};
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SOCKET_BUFFER_SIZE;
use crate::error::RpcError;
use crate::store::{ObjectStore, StoreError};
use crate::wire::{Frame, read_frame, write_frame};

/// Connection counters of a running server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub open: usize,
    pub peak_open: usize,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    open: AtomicUsize,
    peak_open: AtomicUsize,
}

/// Decrements the open-connection count when a connection task ends.
struct OpenGuard(Arc<Counters>);

impl OpenGuard {
    fn new(counters: Arc<Counters>) -> Self {
        counters.accepted.fetch_add(1, Ordering::SeqCst);
        let open = counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_open.fetch_max(open, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.open.fetch_sub(1, Ordering::SeqCst);
    }
}

type Reply = (Message, Vec<u8>);

/// Serves the node protocol until cancelled.
#[derive(Clone)]
pub struct NodeServer {
    store: Arc<ObjectStore>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl NodeServer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self::with_store(Arc::new(ObjectStore::new()), cancel)
    }

    pub fn with_store(store: Arc<ObjectStore>, cancel: CancellationToken) -> Self {
        Self {
            store,
            counters: Arc::new(Counters::default()),
            cancel,
        }
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            accepted: self.counters.accepted.load(Ordering::SeqCst),
            open: self.counters.open.load(Ordering::SeqCst),
            peak_open: self.counters.peak_open.load(Ordering::SeqCst),
        }
    }

    /// Binds a listener. Use port 0 for an ephemeral port.
    pub async fn listen(&self, addr: &str) -> Result<(SocketAddr, TcpListener), RpcError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(%local, "storage node listening");
        Ok((local, listener))
    }

    /// Accepts connections until the cancellation token fires.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RpcError> {
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("storage node shutting down");
                    return Ok(());
                }
                result = listener.accept() => result?,
            };

            debug!(%peer, "connection accepted");
            let server = self.clone();
            let guard = OpenGuard::new(self.counters.clone());
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(%peer, error = %e, "connection ended with error");
                } else {
                    debug!(%peer, "connection closed");
                }
            });
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<(), RpcError> {
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(SOCKET_BUFFER_SIZE, reader);
        let mut writer = BufWriter::with_capacity(SOCKET_BUFFER_SIZE, writer);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                result = read_frame(&mut reader) => match result? {
                    Some(frame) => frame,
                    None => return Ok(()),
                },
            };

            let (reply, body) = self.dispatch(frame);
            write_frame(&mut writer, &reply, &body).await?;
        }
    }

    fn dispatch(&self, frame: Frame) -> Reply {
        let request = frame.header;
        match self.handle(&request, frame.body) {
            Ok(reply) => reply,
            Err(e) => {
                debug!(
                    id = %request.id,
                    msg_type = ?request.msg_type,
                    code = e.code,
                    error = %e,
                    "request failed"
                );
                (request.reply_error(e.code, e.message), Vec::new())
            }
        }
    }

    fn handle(&self, request: &Message, body: Vec<u8>) -> Result<Reply, StoreError> {
        match request.msg_type {
            MessageType::Ping => reply(
                request,
                MessageType::Pong,
                &Pong {
                    protocol_version: PROTOCOL_VERSION,
                },
            ),
            MessageType::CreateBucket => {
                let req: CreateBucketRequest = parse(request)?;
                let bucket = self.store.create_bucket(&req.name)?;
                reply(request, MessageType::BucketCreated, &bucket)
            }
            MessageType::ObjectInfo => {
                let req: ObjectInfoRequest = parse(request)?;
                let info = self.store.object_info(&req.bucket, &req.name)?;
                reply(request, MessageType::ObjectInfoResponse, &info)
            }
            MessageType::BeginUpload => {
                let req: BeginUploadRequest = parse(request)?;
                let transfer_id = self.store.begin_upload(&req)?;
                reply(request, MessageType::UploadStarted, &UploadStarted { transfer_id })
            }
            MessageType::PutSegment => {
                let req: PutSegmentRequest = parse(request)?;
                let size = self
                    .store
                    .put_segment(&req.transfer_id, req.index, &req.checksum, body)?;
                reply(
                    request,
                    MessageType::SegmentStored,
                    &SegmentStored {
                        index: req.index,
                        size,
                    },
                )
            }
            MessageType::CommitUpload => {
                let req: CommitUploadRequest = parse(request)?;
                let info = self.store.commit_upload(&req)?;
                reply(request, MessageType::UploadCommitted, &info)
            }
            MessageType::GetSegment => {
                let req: GetSegmentRequest = parse(request)?;
                let (data, checksum) = self.store.get_segment(&req.bucket, &req.name, req.index)?;
                let (msg, _) = reply(
                    request,
                    MessageType::SegmentData,
                    &SegmentData {
                        index: req.index,
                        checksum,
                    },
                )?;
                Ok((msg, data))
            }
            other => Err(StoreError::invalid(format!(
                "unsupported request type: {other:?}"
            ))),
        }
    }
}

fn parse<T: DeserializeOwned>(request: &Message) -> Result<T, StoreError> {
    request
        .parse_payload()
        .map_err(|e| StoreError::invalid(format!("invalid payload: {e}")))?
        .ok_or_else(|| StoreError::invalid("missing payload"))
}

fn reply<T: Serialize>(
    request: &Message,
    msg_type: MessageType,
    payload: &T,
) -> Result<Reply, StoreError> {
    let msg = request
        .reply(msg_type, Some(payload))
        .map_err(|e| StoreError::internal(format!("failed to encode reply: {e}")))?;
    Ok((msg, Vec::new()))
}
