//! Length-prefixed text framing for `tokio_util`.
//!
//! ```text
//! frame := u32 length (big-endian) ++ utf8 bytes[length]
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::EqError;

/// Size of the length prefix on the wire.
pub const LENGTH_PREFIX: usize = std::mem::size_of::<u32>();

/// Default upper bound for a single frame payload (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Codec turning a byte stream into UTF-8 text messages and back.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = EqError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX]);
        let length = u32::from_be_bytes(prefix) as usize;

        if length > self.max_frame_size {
            return Err(EqError::FrameTooLarge {
                size: length,
                max: self.max_frame_size,
            });
        }

        if src.len() < LENGTH_PREFIX + length {
            src.reserve(LENGTH_PREFIX + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let payload = src.split_to(length);
        let text = String::from_utf8(payload.to_vec())?;
        Ok(Some(text))
    }

    /// A frame cut short by the peer closing the socket ends the stream
    /// quietly instead of raising an error.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !buf.is_empty() {
                    debug!(remaining = buf.len(), "socket closed mid-frame");
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for FrameCodec {
    type Error = EqError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let bytes = item.as_ref().as_bytes();
        if bytes.len() > self.max_frame_size {
            return Err(EqError::FrameTooLarge {
                size: bytes.len(),
                max: self.max_frame_size,
            });
        }
        dst.reserve(LENGTH_PREFIX + bytes.len());
        dst.put_u32(bytes.len() as u32);
        dst.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Vec<u8> {
        let mut out = (text.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn encodes_big_endian_length_prefix() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("volume:3", &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 8]);
        assert_eq!(&buf[4..], b"volume:3");
    }

    #[test]
    fn waits_for_complete_frame() {
        let mut codec = FrameCodec::new();
        let bytes = frame("playback:play");
        let mut buf = BytesMut::from(&bytes[..6]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[6..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("playback:play"));
        assert!(buf.is_empty());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame("filter:added"));
        buf.extend_from_slice(&frame("filter:removed"));

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("filter:added"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("filter:removed"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn empty_frame_is_empty_string() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn multibyte_utf8_length_counts_bytes() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("artist:Björk", &mut buf).unwrap();
        assert_eq!(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]), 13);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("artist:Björk"));
    }

    #[test]
    fn rejects_oversized_length() {
        let mut codec = FrameCodec::with_max_frame_size(8);
        let mut buf = BytesMut::from(&frame("trackname:too long")[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(EqError::FrameTooLarge { size: 18, max: 8 })
        ));

        let mut out = BytesMut::new();
        assert!(codec.encode("trackname:too long", &mut out).is_err());
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 2, 0xff, 0xfe][..]);
        assert!(matches!(codec.decode(&mut buf), Err(EqError::InvalidUtf8(_))));
    }

    #[test]
    fn truncated_frame_at_eof_ends_quietly() {
        let mut codec = FrameCodec::new();
        let bytes = frame("filters:1,2,3");
        let mut buf = BytesMut::from(&bytes[..7]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
