// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

//! Frame layout, all integers big-endian:
//!
//! `receiver role u16 | sender id [u8; 8] | kind u16 | hash len u16 | hash | payload len u32 | payload`

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use cellmesh_base::{DecodeError, SliceReader, IDENTIFIER_LEN};

use crate::message::{Message, MessageKind, PeerRole, MAX_PAYLOAD_LEN};
use crate::ProtocolError;

/// Role, identifier, kind and hash length.
pub const FIXED_HEADER_LEN: usize = 2 + IDENTIFIER_LEN + 2 + 2;

const PAYLOAD_LEN_SIZE: usize = 4;

impl Message {
    #[inline]
    pub fn frame_len(&self) -> usize {
        FIXED_HEADER_LEN + self.content_hash().len() + PAYLOAD_LEN_SIZE + self.payload().len()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.frame_len());
        dst.put_u16(self.receiver().to_tag());
        dst.put_slice(self.sender());
        dst.put_u16(self.kind().to_tag());
        dst.put_u16(self.content_hash().len() as u16);
        dst.put_slice(self.content_hash());
        dst.put_u32(self.payload().len() as u32);
        dst.put_slice(self.payload());
    }

    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.frame_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decodes exactly one frame. Leftover bytes are an error.
    pub fn from_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = SliceReader::new(frame);
        let receiver = PeerRole::from_tag(r.read_u16_be("receiver role")?)?;
        let sender = r.read_array::<IDENTIFIER_LEN>("sender")?;
        let kind = MessageKind::from_tag(r.read_u16_be("kind")?)?;
        let content_hash = r.read_u16_prefixed("content hash")?.to_vec();

        let payload_len = r.read_u32_be("payload length")? as usize;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload_len));
        }
        let payload = r.read_slice("payload", payload_len)?.to_vec();

        if r.remaining() != 0 {
            return Err(ProtocolError::TrailingBytes(r.remaining()));
        }
        Message::from_parts(receiver, sender, kind, content_hash, payload)
    }
}

/// Bytes needed before the next decoding step can make progress.
/// Once `buf` holds at least this many bytes, it is the full frame length.
fn required_len(buf: &[u8]) -> Result<usize, ProtocolError> {
    if buf.len() < FIXED_HEADER_LEN {
        return Ok(FIXED_HEADER_LEN);
    }

    let hash_len = u16::from_be_bytes([buf[FIXED_HEADER_LEN - 2], buf[FIXED_HEADER_LEN - 1]]) as usize;
    let len_at = FIXED_HEADER_LEN + hash_len;
    if buf.len() < len_at + PAYLOAD_LEN_SIZE {
        return Ok(len_at + PAYLOAD_LEN_SIZE);
    }

    let payload_len =
        u32::from_be_bytes([buf[len_at], buf[len_at + 1], buf[len_at + 2], buf[len_at + 3]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }
    Ok(len_at + PAYLOAD_LEN_SIZE + payload_len)
}

/// Stream codec for [`Message`] frames, used with `FramedRead`/`FramedWrite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl MessageCodec {
    pub fn new() -> Self { Self }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let need = required_len(src)?;
        if src.len() < need {
            src.reserve(need - src.len());
            return Ok(None);
        }

        let frame = src.split_to(need);
        Message::from_frame(&frame).map(Some)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if buf.is_empty() {
            return Ok(None);
        }

        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None => Err(DecodeError::UnexpectedEof {
                field: "frame",
                needed: required_len(buf)?,
                remaining: buf.len(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use cellmesh_base::create_identifier;

    use super::*;
    use crate::message::Operation;

    fn request() -> Message {
        let sender = create_identifier("localhost", 4000).unwrap();
        Message::request(sender, Operation::Div, 10, 2, 0)
    }

    #[test]
    fn test_frame_layout() {
        let sender = create_identifier("localhost", 4000).unwrap();
        let msg = Message::identify(PeerRole::Requester, sender, PeerRole::Node);
        let frame = msg.to_frame();

        assert_eq!(frame.len(), msg.frame_len());
        assert_eq!(&frame[0..2], &[0, 0]);
        assert_eq!(&frame[2..10], &sender);
        assert_eq!(&frame[10..12], &[0, 0]);
        assert_eq!(&frame[12..14], &[0, 32]);
        assert_eq!(&frame[46..50], &[0, 0, 0, 1]);
        assert_eq!(frame[50], 2);

        assert_eq!(Message::from_frame(&frame).unwrap(), msg);
    }

    #[test]
    fn test_result_frames() {
        let server = create_identifier("localhost", 4002).unwrap();
        let ok = Message::result(server, &request(), 5);
        let failed = Message::error_result(server, &request(), "division by zero");

        let decoded = Message::from_frame(&ok.to_frame()).unwrap();
        assert_eq!(decoded, ok);
        assert_eq!(decoded.result_body().unwrap().outcome, Ok(5));

        let decoded = Message::from_frame(&failed.to_frame()).unwrap();
        assert_eq!(decoded, failed);
        assert_eq!(decoded.result_body().unwrap().outcome, Err("division by zero".to_string()));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut frame = request().to_frame().to_vec();
        frame.push(0);
        assert!(matches!(Message::from_frame(&frame), Err(ProtocolError::TrailingBytes(1))));
    }

    #[test]
    fn test_unknown_tags() {
        let mut frame = request().to_frame().to_vec();
        frame[1] = 7;
        assert!(matches!(Message::from_frame(&frame), Err(ProtocolError::UnknownRole(7))));

        let mut frame = request().to_frame().to_vec();
        frame[11] = 42;
        assert!(matches!(Message::from_frame(&frame), Err(ProtocolError::UnknownKind(42))));
    }

    #[test]
    fn test_decode_in_pieces() {
        let msg = request();
        let frame = msg.to_frame();
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        for chunk in frame.chunks(5) {
            assert!(buf.is_empty() || codec.decode(&mut buf).unwrap().is_none());
            buf.extend_from_slice(chunk);
        }

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(msg));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_back_to_back() {
        let first = request();
        let sender = create_identifier("localhost", 4001).unwrap();
        let second = Message::ack(PeerRole::Requester, sender, &first);

        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(first.clone(), &mut buf).unwrap();
        codec.encode(second.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(first));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(second));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_short_read_at_eof() {
        let frame = request().to_frame();
        let mut buf = BytesMut::from(&frame[..frame.len() - 3]);
        let err = MessageCodec::new().decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::ShortRead(_)));

        let mut empty = BytesMut::new();
        assert!(MessageCodec::new().decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_oversized_payload() {
        let frame = request().to_frame();
        let hash_end = FIXED_HEADER_LEN + 32;
        let mut buf = BytesMut::from(&frame[..hash_end]);
        buf.put_u32((MAX_PAYLOAD_LEN + 1) as u32);

        let err = MessageCodec::new().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }
}
