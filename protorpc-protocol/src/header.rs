//! Request and response headers.
//!
//! Headers travel in their own frame ahead of the body so a receiver can
//! bound header parsing independently of body size. They are encoded in the
//! protobuf wire format:
//!
//! ```text
//! RequestHeader                 ResponseHeader
//!   1: id              varint     1: id              varint
//!   2: method          bytes      2: error           bytes
//!   3: raw_length      varint     3: raw_length      varint
//!   4: compressed_len  varint     4: compressed_len  varint
//!   5: checksum        varint     5: checksum        varint
//! ```
//!
//! Unknown fields are skipped on decode.

use crate::error::ProtocolError;
use crate::varint::{get_uvarint, put_uvarint};
use bytes::{Buf, BufMut, BytesMut};

/// Largest encoded header either side will send or accept.
pub const MAX_HEADER_LEN: usize = 1024;

const FIELD_ID: u64 = 1;
const FIELD_TEXT: u64 = 2;
const FIELD_RAW_LENGTH: u64 = 3;
const FIELD_COMPRESSED_LENGTH: u64 = 4;
const FIELD_CHECKSUM: u64 = 5;

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

/// Header preceding a request body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    /// Call id chosen by the client.
    pub id: u64,
    /// Method name as the caller spelled it, before normalization.
    pub method: String,
    /// Length of the serialized request before compression.
    pub raw_length: u64,
    /// Length of the compressed body frame.
    pub compressed_length: u64,
    /// CRC32C of the compressed body.
    pub checksum: u32,
}

/// Header preceding a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Id of the request being answered.
    pub id: u64,
    /// Application error text; empty on success.
    pub error: String,
    /// Length of the serialized response before compression.
    pub raw_length: u64,
    /// Length of the compressed body frame.
    pub compressed_length: u64,
    /// CRC32C of the compressed body.
    pub checksum: u32,
}

impl RequestHeader {
    pub fn encode(&self) -> BytesMut {
        encode_fields(
            self.id,
            &self.method,
            self.raw_length,
            self.compressed_length,
            self.checksum,
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let f = Fields::decode(buf)?;
        Ok(Self {
            id: f.id,
            method: f.text,
            raw_length: f.raw_length,
            compressed_length: f.compressed_length,
            checksum: f.checksum,
        })
    }
}

impl ResponseHeader {
    pub fn encode(&self) -> BytesMut {
        encode_fields(
            self.id,
            &self.error,
            self.raw_length,
            self.compressed_length,
            self.checksum,
        )
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let f = Fields::decode(buf)?;
        Ok(Self {
            id: f.id,
            error: f.text,
            raw_length: f.raw_length,
            compressed_length: f.compressed_length,
            checksum: f.checksum,
        })
    }

    /// Returns whether the call succeeded at the application level.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

fn encode_fields(
    id: u64,
    text: &str,
    raw_length: u64,
    compressed_length: u64,
    checksum: u32,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(32 + text.len());

    put_uvarint(&mut buf, FIELD_ID << 3 | WIRE_VARINT);
    put_uvarint(&mut buf, id);

    put_uvarint(&mut buf, FIELD_TEXT << 3 | WIRE_LEN);
    put_uvarint(&mut buf, text.len() as u64);
    buf.put_slice(text.as_bytes());

    put_uvarint(&mut buf, FIELD_RAW_LENGTH << 3 | WIRE_VARINT);
    put_uvarint(&mut buf, raw_length);

    put_uvarint(&mut buf, FIELD_COMPRESSED_LENGTH << 3 | WIRE_VARINT);
    put_uvarint(&mut buf, compressed_length);

    put_uvarint(&mut buf, FIELD_CHECKSUM << 3 | WIRE_VARINT);
    put_uvarint(&mut buf, u64::from(checksum));

    buf
}

#[derive(Default)]
struct Fields {
    id: u64,
    text: String,
    raw_length: u64,
    compressed_length: u64,
    checksum: u32,
}

impl Fields {
    fn decode(mut buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut f = Fields::default();

        while buf.has_remaining() {
            let key = get_uvarint(&mut buf).map_err(malformed)?;
            let field = key >> 3;
            let wire_type = key & 0x7;
            if field == 0 {
                return Err(ProtocolError::MalformedHeader("field number zero"));
            }

            match (field, wire_type) {
                (FIELD_ID, WIRE_VARINT) => f.id = get_uvarint(&mut buf).map_err(malformed)?,
                (FIELD_TEXT, WIRE_LEN) => {
                    let bytes = take_len_delimited(&mut buf)?;
                    f.text = String::from_utf8(bytes.to_vec())
                        .map_err(|_| ProtocolError::MalformedHeader("text is not valid UTF-8"))?;
                }
                (FIELD_RAW_LENGTH, WIRE_VARINT) => {
                    f.raw_length = get_uvarint(&mut buf).map_err(malformed)?
                }
                (FIELD_COMPRESSED_LENGTH, WIRE_VARINT) => {
                    f.compressed_length = get_uvarint(&mut buf).map_err(malformed)?
                }
                (FIELD_CHECKSUM, WIRE_VARINT) => {
                    let v = get_uvarint(&mut buf).map_err(malformed)?;
                    f.checksum = u32::try_from(v)
                        .map_err(|_| ProtocolError::MalformedHeader("checksum exceeds 32 bits"))?;
                }
                (FIELD_ID..=FIELD_CHECKSUM, _) => {
                    return Err(ProtocolError::MalformedHeader("unexpected wire type"));
                }
                (_, wt) => skip_field(&mut buf, wt)?,
            }
        }

        Ok(f)
    }
}

fn take_len_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], ProtocolError> {
    let len = get_uvarint(buf).map_err(malformed)?;
    if len > buf.len() as u64 {
        return Err(ProtocolError::MalformedHeader("truncated field"));
    }
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(len as usize);
    *buf = tail;
    Ok(head)
}

fn skip_field(buf: &mut &[u8], wire_type: u64) -> Result<(), ProtocolError> {
    let skip = match wire_type {
        WIRE_VARINT => {
            get_uvarint(buf).map_err(malformed)?;
            return Ok(());
        }
        WIRE_LEN => {
            take_len_delimited(buf)?;
            return Ok(());
        }
        WIRE_FIXED64 => 8,
        WIRE_FIXED32 => 4,
        _ => return Err(ProtocolError::MalformedHeader("unsupported wire type")),
    };
    if buf.len() < skip {
        return Err(ProtocolError::MalformedHeader("truncated field"));
    }
    buf.advance(skip);
    Ok(())
}

fn malformed(err: ProtocolError) -> ProtocolError {
    match err {
        ProtocolError::TruncatedVarint => ProtocolError::MalformedHeader("truncated varint"),
        other => other,
    }
}
