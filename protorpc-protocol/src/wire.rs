//! Request and response exchange.
//!
//! A call is two frames in each direction, header first:
//!
//! ```text
//! client -> server   [RequestHeader frame][compressed request frame]
//! server -> client   [ResponseHeader frame][compressed response frame]
//! ```
//!
//! Bodies are Snappy-compressed and carry a CRC32C of the compressed bytes
//! in the header. On receipt the checks run in a fixed order: checksum,
//! decompression, raw length, then deserialization.

use crate::compress::{checksum, compress, decompress};
use crate::conn::Conn;
use crate::error::ProtocolError;
use crate::header::{RequestHeader, ResponseHeader, MAX_HEADER_LEN};
use crate::message::Message;
use crate::MAX_FRAME_SIZE;
use tokio::io::{AsyncRead, AsyncWrite};

/// A body ready for the wire.
struct PackedBody {
    raw_length: u64,
    compressed: Vec<u8>,
    checksum: u32,
}

impl PackedBody {
    /// Compresses `raw`. A missing body is packed as an empty message, so
    /// it still travels as a Snappy block.
    fn pack(raw: Option<&[u8]>) -> Result<Self, ProtocolError> {
        let raw = raw.unwrap_or_default();
        check_body_len(raw.len())?;
        let compressed = compress(raw)?;
        check_body_len(compressed.len())?;
        Ok(Self {
            raw_length: raw.len() as u64,
            checksum: checksum(&compressed),
            compressed,
        })
    }
}

fn check_body_len(len: usize) -> Result<(), ProtocolError> {
    let size = len as u64;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

fn unpack(frame: &[u8], raw_length: u64, expected_crc: u32) -> Result<Vec<u8>, ProtocolError> {
    let actual = checksum(frame);
    if actual != expected_crc {
        return Err(ProtocolError::CrcMismatch {
            expected: expected_crc,
            actual,
        });
    }
    let raw = decompress(frame)?;
    if raw.len() as u64 != raw_length {
        return Err(ProtocolError::RawLengthMismatch {
            expected: raw_length,
            actual: raw.len() as u64,
        });
    }
    Ok(raw)
}

fn check_header_len(len: usize) -> Result<(), ProtocolError> {
    if len > MAX_HEADER_LEN {
        return Err(ProtocolError::HeaderTooLarge {
            size: len,
            max: MAX_HEADER_LEN,
        });
    }
    Ok(())
}

async fn write_call<S>(conn: &mut Conn<S>, header: &[u8], body: &[u8]) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    check_header_len(header.len())?;
    conn.write_frame(Some(header)).await?;
    conn.write_frame(Some(body)).await
}

async fn read_header_frame<S>(conn: &mut Conn<S>) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let size = conn.read_varint().await?;
    if size > MAX_HEADER_LEN as u64 {
        conn.env()
            .log(format_args!("protorpc: header of {size} bytes exceeds {MAX_HEADER_LEN}"));
        return Err(ProtocolError::HeaderTooLarge {
            size: usize::try_from(size).unwrap_or(usize::MAX),
            max: MAX_HEADER_LEN,
        });
    }
    conn.read_exact(size as usize).await
}

/// Sends a request with an already-encoded body. `None` sends an empty message.
pub async fn send_request_raw<S>(
    conn: &mut Conn<S>,
    id: u64,
    method: &str,
    body: Option<&[u8]>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = PackedBody::pack(body)?;
    let header = RequestHeader {
        id,
        method: method.to_string(),
        raw_length: body.raw_length,
        compressed_length: body.compressed.len() as u64,
        checksum: body.checksum,
    }
    .encode();
    write_call(conn, &header, &body.compressed).await
}

/// Sends a typed request.
pub async fn send_request<S, M>(
    conn: &mut Conn<S>,
    id: u64,
    method: &str,
    request: Option<&M>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: Message,
{
    let raw = request.map(|m| m.encode()).transpose()?;
    send_request_raw(conn, id, method, raw.as_deref()).await
}

pub async fn recv_request_header<S>(conn: &mut Conn<S>) -> Result<RequestHeader, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = read_header_frame(conn).await?;
    RequestHeader::decode(&frame)
}

/// Receives and verifies a request body, returning the raw bytes.
pub async fn recv_request_body_raw<S>(
    conn: &mut Conn<S>,
    header: &RequestHeader,
) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = conn.read_frame().await?;
    unpack(&frame, header.raw_length, header.checksum)
}

pub async fn recv_request_body<S, M>(
    conn: &mut Conn<S>,
    header: &RequestHeader,
) -> Result<M, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: Message,
{
    let raw = recv_request_body_raw(conn, header).await?;
    M::decode(&raw)
}

/// Sends a response with an already-encoded body. `error` is empty on
/// success.
pub async fn send_response_raw<S>(
    conn: &mut Conn<S>,
    id: u64,
    error: &str,
    body: Option<&[u8]>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = PackedBody::pack(body)?;
    let header = ResponseHeader {
        id,
        error: error.to_string(),
        raw_length: body.raw_length,
        compressed_length: body.compressed.len() as u64,
        checksum: body.checksum,
    }
    .encode();
    write_call(conn, &header, &body.compressed).await
}

pub async fn send_response<S, M>(
    conn: &mut Conn<S>,
    id: u64,
    error: &str,
    response: Option<&M>,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: Message,
{
    let raw = response.map(|m| m.encode()).transpose()?;
    send_response_raw(conn, id, error, raw.as_deref()).await
}

pub async fn recv_response_header<S>(conn: &mut Conn<S>) -> Result<ResponseHeader, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = read_header_frame(conn).await?;
    ResponseHeader::decode(&frame)
}

pub async fn recv_response_body_raw<S>(
    conn: &mut Conn<S>,
    header: &ResponseHeader,
) -> Result<Vec<u8>, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = conn.read_frame().await?;
    unpack(&frame, header.raw_length, header.checksum)
}

pub async fn recv_response_body<S, M>(
    conn: &mut Conn<S>,
    header: &ResponseHeader,
) -> Result<M, ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    M: Message,
{
    let raw = recv_response_body_raw(conn, header).await?;
    M::decode(&raw)
}
