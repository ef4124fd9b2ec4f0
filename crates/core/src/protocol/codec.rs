//! Postcard serialization codec for message envelopes

use postcard::{from_bytes, to_allocvec};

use crate::error::{CoreError, Result};
use crate::types::Envelope;

/// Message codec for serialization/deserialization
///
/// Frames are length-prefixed: [4 bytes length (big endian)] [payload].
/// The size limit is the client's configured `max_message_size` and is
/// enforced on both the encode and decode paths.
pub struct MessageCodec;

impl MessageCodec {
    /// Encode an envelope to a length-prefixed frame
    pub fn encode(msg: &Envelope, max_size: usize) -> Result<Vec<u8>> {
        let payload = to_allocvec(msg).map_err(CoreError::from)?;

        if payload.len() > max_size {
            return Err(CoreError::MessageTooLarge {
                size: payload.len(),
                max: max_size,
            });
        }

        let len = payload.len() as u32;
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&payload);

        Ok(buf)
    }

    /// Decode an envelope from a length-prefixed frame
    pub fn decode(buf: &[u8], max_size: usize) -> Result<Envelope> {
        if buf.len() < 4 {
            return Err(CoreError::InvalidMessageFormat(
                "Buffer too small for length prefix".into(),
            ));
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if len > max_size {
            return Err(CoreError::MessageTooLarge {
                size: len,
                max: max_size,
            });
        }

        if buf.len() < 4 + len {
            return Err(CoreError::InvalidMessageFormat(
                "Buffer too small for payload".into(),
            ));
        }

        Self::decode_payload(&buf[4..4 + len])
    }

    /// Decode an envelope from an already-deframed payload
    pub fn decode_payload(payload: &[u8]) -> Result<Envelope> {
        from_bytes(payload).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MAX_MESSAGE_SIZE;

    fn sample() -> Envelope {
        Envelope::new(b"payload".to_vec(), "orders", "peer-a", vec![], 1024).unwrap()
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = sample();
        let encoded = MessageCodec::encode(&msg, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        let decoded = MessageCodec::decode(&encoded, DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_length_prefix_matches_payload() {
        let encoded = MessageCodec::encode(&sample(), DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        let len = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(len + 4, encoded.len());
    }

    #[test]
    fn test_encode_enforces_max_size() {
        let msg = Envelope::new(vec![0u8; 512], "t", "d", vec![], 1024).unwrap();
        let result = MessageCodec::encode(&msg, 64);
        assert!(matches!(result, Err(CoreError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_decode_enforces_max_size() {
        let encoded = MessageCodec::encode(&sample(), DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        let result = MessageCodec::decode(&encoded, 4);
        assert!(matches!(result, Err(CoreError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_invalid_buffer() {
        let result = MessageCodec::decode(&[1, 2, 3], DEFAULT_MAX_MESSAGE_SIZE);
        assert!(result.is_err());
    }

    #[test]
    fn test_truncated_payload() {
        let mut encoded = MessageCodec::encode(&sample(), DEFAULT_MAX_MESSAGE_SIZE).unwrap();
        encoded.truncate(encoded.len() - 1);
        let result = MessageCodec::decode(&encoded, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(matches!(result, Err(CoreError::InvalidMessageFormat(_))));
    }
}
