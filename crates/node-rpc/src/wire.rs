//! Frame codec for node RPC.
//!
//! # Wire format
//!
//! ```text
//! [4 bytes BE: header_len]
//! [header_len bytes: JSON Message envelope]
//! [8 bytes BE: body_len]
//! [body_len bytes: raw segment data]
//! ```
//!
//! Requests and responses use the same layout. Only `put_segment` requests
//! and `segment_data` responses carry a non-empty body.

use silo_protocol::Message;
use silo_protocol::constants::{MAX_HEADER_SIZE, MAX_PAYLOAD_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RpcError;

/// One decoded frame.
#[derive(Debug)]
pub struct Frame {
    pub header: Message,
    pub body: Vec<u8>,
}

/// Writes a frame and flushes the writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &Message,
    body: &[u8],
) -> Result<(), RpcError> {
    let json = serde_json::to_vec(header)?;
    if json.len() > MAX_HEADER_SIZE {
        return Err(RpcError::Protocol(format!(
            "header too large: {} bytes (max {MAX_HEADER_SIZE})",
            json.len()
        )));
    }
    if body.len() as u64 > MAX_PAYLOAD_SIZE {
        return Err(RpcError::Protocol(format!(
            "body too large: {} bytes (max {MAX_PAYLOAD_SIZE})",
            body.len()
        )));
    }

    writer.write_u32(json.len() as u32).await?;
    writer.write_all(&json).await?;
    writer.write_u64(body.len() as u64).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `None` if the peer closed the stream cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Frame>, RpcError> {
    let header_len = match reader.read_u32().await {
        Ok(n) => n as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if header_len == 0 || header_len > MAX_HEADER_SIZE {
        return Err(RpcError::Protocol(format!(
            "invalid header length: {header_len}"
        )));
    }

    let mut header_buf = vec![0u8; header_len];
    reader.read_exact(&mut header_buf).await?;
    let header: Message = serde_json::from_slice(&header_buf)?;

    let body_len = reader.read_u64().await?;
    if body_len > MAX_PAYLOAD_SIZE {
        return Err(RpcError::Protocol(format!(
            "body too large: {body_len} bytes (max {MAX_PAYLOAD_SIZE})"
        )));
    }
    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body).await?;

    Ok(Some(Frame { header, body }))
}

#[cfg(test)]
mod tests {
    use silo_protocol::{MessageType, PutSegmentRequest};

    use super::*;

    #[tokio::test]
    async fn frame_with_body() {
        let req = PutSegmentRequest {
            transfer_id: "t-1".into(),
            index: 3,
            checksum: "abc".into(),
        };
        let msg = Message::new("1", MessageType::PutSegment, Some(&req)).unwrap();

        let mut buf = Vec::new();
        write_frame(&mut buf, &msg, b"segment bytes").await.unwrap();

        let mut cursor = &buf[..];
        let frame = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(frame.header.msg_type, MessageType::PutSegment);
        assert_eq!(frame.body, b"segment bytes");
        let parsed: PutSegmentRequest = frame.header.parse_payload().unwrap().unwrap();
        assert_eq!(parsed, req);
    }

    #[tokio::test]
    async fn consecutive_frames_then_eof() {
        let ping = Message::new::<()>("1", MessageType::Ping, None).unwrap();
        let err = Message::error("2", 404, "missing");

        let mut buf = Vec::new();
        write_frame(&mut buf, &ping, &[]).await.unwrap();
        write_frame(&mut buf, &err, &[]).await.unwrap();

        let mut cursor = &buf[..];
        let first = read_frame(&mut cursor).await.unwrap().unwrap();
        assert_eq!(first.header.id, "1");
        assert!(first.body.is_empty());

        let second = read_frame(&mut cursor).await.unwrap().unwrap();
        assert!(second.header.is_error());

        assert!(read_frame(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_oversized_header_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_HEADER_SIZE as u32) + 1).to_be_bytes());

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[tokio::test]
    async fn rejects_oversized_body_length() {
        let ping = Message::new::<()>("1", MessageType::Ping, None).unwrap();
        let json = serde_json::to_vec(&ping).unwrap();

        let mut buf = Vec::new();
        buf.extend_from_slice(&(json.len() as u32).to_be_bytes());
        buf.extend_from_slice(&json);
        buf.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(RpcError::Protocol(_))));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let ping = Message::new::<()>("1", MessageType::Ping, None).unwrap();
        let mut buf = Vec::new();
        write_frame(&mut buf, &ping, b"0123456789").await.unwrap();
        buf.truncate(buf.len() - 4);

        let mut cursor = &buf[..];
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(RpcError::Io(_))));
    }
}
