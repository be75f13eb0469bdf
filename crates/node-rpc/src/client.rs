//! TCP client for a storage node.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use silo_connection::{Connection, ConnectionError, Connector};
use silo_protocol::constants::{DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};
use silo_protocol::{
    BeginUploadRequest, BucketInfo, CommitUploadRequest, CreateBucketRequest, GetSegmentRequest,
    Message, MessageType, ObjectInfo, ObjectInfoRequest, Pong, PutSegmentRequest, SegmentData,
    SegmentStored, UploadStarted,
};
use tokio::io::{BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, trace};

use crate::error::RpcError;
use crate::rpc::{FetchedSegment, NodeRpc};
use crate::wire::{Frame, read_frame, write_frame};
use crate::SOCKET_BUFFER_SIZE;

/// Timeouts applied by [`NodeClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// A single TCP connection to a storage node.
///
/// A call that does not run to completion (timeout, I/O failure, or the
/// future being dropped) leaves the stream mid-frame, so the client marks
/// itself broken and refuses further calls.
pub struct NodeClient {
    addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    call_timeout: Duration,
    next_id: u64,
    broken: bool,
}

impl NodeClient {
    /// Connects to the node at `addr`.
    pub async fn connect(addr: &str, options: &ClientOptions) -> Result<Self, RpcError> {
        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RpcError::Timeout)??;
        stream.set_nodelay(true)?;
        debug!(addr, "connected to storage node");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            addr: addr.to_string(),
            reader: BufReader::with_capacity(SOCKET_BUFFER_SIZE, reader),
            writer: BufWriter::with_capacity(SOCKET_BUFFER_SIZE, writer),
            call_timeout: options.call_timeout,
            next_id: 0,
            broken: false,
        })
    }

    /// Address this client is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one request and waits for its reply.
    async fn call<T: Serialize>(
        &mut self,
        msg_type: MessageType,
        payload: Option<&T>,
        body: &[u8],
    ) -> Result<Frame, RpcError> {
        if self.broken {
            return Err(RpcError::Closed);
        }

        self.next_id += 1;
        let request = Message::new(self.next_id.to_string(), msg_type, payload)?;
        trace!(addr = %self.addr, id = %request.id, ?msg_type, body_len = body.len(), "rpc call");

        self.broken = true;
        let reader = &mut self.reader;
        let writer = &mut self.writer;
        let exchange = async move {
            write_frame(writer, &request, body).await?;
            let frame = read_frame(reader).await?.ok_or(RpcError::Closed)?;
            if frame.header.id != request.id {
                return Err(RpcError::Protocol(format!(
                    "reply id {} does not match request {}",
                    frame.header.id, request.id
                )));
            }
            Ok(frame)
        };
        let frame = tokio::time::timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| RpcError::Timeout)??;
        self.broken = false;

        if frame.header.is_error() {
            let body = frame.header.error.ok_or_else(|| {
                RpcError::Protocol("error reply without error body".into())
            })?;
            return Err(RpcError::from_body(body));
        }

        let expected = msg_type.reply_type();
        if expected != Some(frame.header.msg_type) {
            return Err(RpcError::Protocol(format!(
                "unexpected reply {:?} to {msg_type:?}",
                frame.header.msg_type
            )));
        }
        Ok(frame)
    }

    async fn call_json<T: Serialize, R: DeserializeOwned>(
        &mut self,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<R, RpcError> {
        let frame = self.call(msg_type, Some(payload), &[]).await?;
        parse_reply(&frame)
    }
}

fn parse_reply<R: DeserializeOwned>(frame: &Frame) -> Result<R, RpcError> {
    frame
        .header
        .parse_payload()?
        .ok_or_else(|| {
            RpcError::Protocol(format!(
                "{:?} reply without payload",
                frame.header.msg_type
            ))
        })
}

impl Connection for NodeClient {
    fn is_broken(&self) -> bool {
        self.broken
    }
}

impl NodeRpc for NodeClient {
    fn ping(&mut self) -> BoxFuture<'_, Result<Pong, RpcError>> {
        Box::pin(async move {
            let frame = self.call::<()>(MessageType::Ping, None, &[]).await?;
            parse_reply(&frame)
        })
    }

    fn create_bucket<'a>(
        &'a mut self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<BucketInfo, RpcError>> {
        Box::pin(async move {
            let req = CreateBucketRequest {
                name: name.to_string(),
            };
            self.call_json(MessageType::CreateBucket, &req).await
        })
    }

    fn object_info<'a>(
        &'a mut self,
        bucket: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<ObjectInfo, RpcError>> {
        Box::pin(async move {
            let req = ObjectInfoRequest {
                bucket: bucket.to_string(),
                name: name.to_string(),
            };
            self.call_json(MessageType::ObjectInfo, &req).await
        })
    }

    fn begin_upload<'a>(
        &'a mut self,
        request: &'a BeginUploadRequest,
    ) -> BoxFuture<'a, Result<String, RpcError>> {
        Box::pin(async move {
            let started: UploadStarted = self.call_json(MessageType::BeginUpload, request).await?;
            Ok(started.transfer_id)
        })
    }

    fn send_segment<'a>(
        &'a mut self,
        transfer_id: &'a str,
        index: u64,
        payload: &'a [u8],
        checksum: &'a str,
    ) -> BoxFuture<'a, Result<SegmentStored, RpcError>> {
        Box::pin(async move {
            let req = PutSegmentRequest {
                transfer_id: transfer_id.to_string(),
                index,
                checksum: checksum.to_string(),
            };
            let frame = self.call(MessageType::PutSegment, Some(&req), payload).await?;
            let stored: SegmentStored = parse_reply(&frame)?;
            if stored.index != index {
                return Err(RpcError::Protocol(format!(
                    "node stored segment {} instead of {index}",
                    stored.index
                )));
            }
            Ok(stored)
        })
    }

    fn commit_upload<'a>(
        &'a mut self,
        request: &'a CommitUploadRequest,
    ) -> BoxFuture<'a, Result<ObjectInfo, RpcError>> {
        Box::pin(async move { self.call_json(MessageType::CommitUpload, request).await })
    }

    fn fetch_segment<'a>(
        &'a mut self,
        bucket: &'a str,
        name: &'a str,
        index: u64,
    ) -> BoxFuture<'a, Result<FetchedSegment, RpcError>> {
        Box::pin(async move {
            let req = GetSegmentRequest {
                bucket: bucket.to_string(),
                name: name.to_string(),
                index,
            };
            let frame = self.call(MessageType::GetSegment, Some(&req), &[]).await?;
            let header: SegmentData = parse_reply(&frame)?;
            if header.index != index {
                return Err(RpcError::Protocol(format!(
                    "node returned segment {} instead of {index}",
                    header.index
                )));
            }
            Ok(FetchedSegment {
                index,
                data: frame.body,
                checksum: header.checksum,
            })
        })
    }
}

/// Opens [`NodeClient`] connections over TCP.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    options: ClientOptions,
}

impl TcpConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }
}

impl Connector for TcpConnector {
    type Conn = NodeClient;

    fn connect<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<NodeClient, ConnectionError>> {
        Box::pin(async move {
            NodeClient::connect(addr, &self.options)
                .await
                .map_err(|e| match e {
                    RpcError::Timeout => ConnectionError::Timeout {
                        addr: addr.to_string(),
                    },
                    other => ConnectionError::connect(addr, other),
                })
        })
    }
}
