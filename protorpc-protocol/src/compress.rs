//! Body compression and checksums.
//!
//! Bodies use the Snappy raw block format. The CRC32C checksum is taken over
//! the compressed bytes, so corruption in transit is caught before the
//! decompressor ever sees the data.

use crate::error::ProtocolError;
use crate::MAX_FRAME_SIZE;

/// CRC32C (Castagnoli) of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Compresses `raw` into a Snappy block.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    Ok(snap::raw::Encoder::new().compress_vec(raw)?)
}

/// Decompresses a Snappy block.
///
/// Senders always emit a Snappy block, even for an empty message. An empty
/// frame from a peer is still accepted as an empty body. The declared
/// decompressed size is checked against [`MAX_FRAME_SIZE`] before any
/// allocation.
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }
    let len = snap::raw::decompress_len(compressed)? as u64;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(snap::raw::Decoder::new().decompress_vec(compressed)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_body() {
        let compressed = compress(b"").unwrap();
        assert_eq!(compressed, vec![0u8]);
        assert!(decompress(&compressed).unwrap().is_empty());
        assert!(decompress(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let raw = "abcdefgh".repeat(512);
        let compressed = compress(raw.as_bytes()).unwrap();
        assert!(compressed.len() < raw.len() / 4);
        assert_eq!(decompress(&compressed).unwrap(), raw.as_bytes());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decompress(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x0f, 0x01]).is_err());
    }

    #[test]
    fn test_checksum_known_value() {
        // Standard CRC32C check value.
        assert_eq!(checksum(b"123456789"), 0xe306_9283);
        assert_eq!(checksum(b""), 0);
    }

    proptest! {
        #[test]
        fn prop_compress_roundtrip(raw in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let compressed = compress(&raw).unwrap();
            prop_assert_eq!(decompress(&compressed).unwrap(), raw);
        }
    }
}
