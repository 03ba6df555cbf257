use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};
use crate::Error;

/// Frames replies coming from the store and encodes outgoing command frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> FrameCodec {
        FrameCodec { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => {
                // A peer streaming an endless reply should not grow the buffer forever.
                if src.len() > self.max_frame_size {
                    return Err(Error::FrameTooLarge(self.max_frame_size));
                }
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let position = cursor.position() as usize;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        frame.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"$5\r\nhel"[..]);

        assert!(matches!(codec.decode(&mut buf), Ok(None)));
        assert_eq!(buf.len(), 7);

        buf.extend_from_slice(b"lo\r\n:1\r\n");

        let frame = codec.decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Bulk(Bytes::from("hello"))));

        let frame = codec.decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::Integer(1)));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&b"$100\r\n0123456789"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::FrameTooLarge(8))
        ));
    }

    #[test]
    fn decode_reports_protocol_errors() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::from(&b"?what\r\n"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(frame::Error::InvalidDataType(b'?')))
        ));
    }

    #[test]
    fn encode_appends_to_buffer() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();

        codec
            .encode(Frame::Array(vec![Frame::Bulk(Bytes::from("PING"))]), &mut buf)
            .unwrap();

        assert_eq!(&buf[..], b"*1\r\n$4\r\nPING\r\n");
    }
}
