// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::fmt;

use cellmesh_base::{short_hex, Identifier, Sha256, SliceReader, SlicesSha256, ToHex};

use crate::message::{MessageKind, Operation, PeerRole};
use crate::ProtocolError;

/// Upper bound on a frame's payload.
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Upper bound on a content hash, fixed by its 2-byte length prefix.
pub const MAX_HASH_LEN: usize = u16::MAX as usize;

/// A framed message. Two messages are the same message iff every field is byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Message {
    receiver: PeerRole,
    sender: Identifier,
    kind: MessageKind,
    content_hash: Vec<u8>,
    payload: Vec<u8>,
}

impl Message {
    pub fn from_parts(
        receiver: PeerRole,
        sender: Identifier,
        kind: MessageKind,
        content_hash: Vec<u8>,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        if content_hash.len() > MAX_HASH_LEN {
            return Err(ProtocolError::HashTooLong(content_hash.len()));
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { receiver, sender, kind, content_hash, payload })
    }

    #[inline]
    pub fn receiver(&self) -> PeerRole { self.receiver }

    #[inline]
    pub fn sender(&self) -> &Identifier { &self.sender }

    #[inline]
    pub fn kind(&self) -> MessageKind { self.kind }

    #[inline]
    pub fn content_hash(&self) -> &[u8] { &self.content_hash }

    #[inline]
    pub fn payload(&self) -> &[u8] { &self.payload }
}

impl Message {
    /// Identification carrying the sender's own role.
    pub fn identify(own: PeerRole, sender: Identifier, receiver: PeerRole) -> Self {
        let payload = vec![own.to_tag() as u8];
        let content_hash = payload.sha256().to_vec();
        Self { receiver, sender, kind: MessageKind::Identification, content_hash, payload }
    }

    /// Arithmetic request addressed to servers.
    ///
    /// The content hash covers the sender, the kind, the operands and a
    /// per-sender sequence number, so equal operands sent twice (or by two
    /// requesters) are still told apart when results come back.
    pub fn request(sender: Identifier, op: Operation, lhs: i32, rhs: i32, sequence: u64) -> Self {
        let kind = op.kind();
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&lhs.to_be_bytes());
        payload.extend_from_slice(&rhs.to_be_bytes());

        let content_hash = [
            &sender[..],
            &kind.to_tag().to_be_bytes()[..],
            &payload[..],
            &sequence.to_be_bytes()[..],
        ]
        .iter()
        .slices_sha256()
        .to_vec();
        Self { receiver: PeerRole::Server, sender, kind, content_hash, payload }
    }

    /// Successful result for `request`.
    pub fn result(sender: Identifier, request: &Message, value: i32) -> Self {
        Self::print_result(sender, request, value, None)
    }

    /// Failed evaluation of `request`; the reason travels after the value.
    pub fn error_result(sender: Identifier, request: &Message, reason: &str) -> Self {
        Self::print_result(sender, request, 0, Some(reason))
    }

    fn print_result(sender: Identifier, request: &Message, value: i32, reason: Option<&str>) -> Self {
        let hash = request.content_hash();
        let reason = reason.map(str::as_bytes).unwrap_or_default();
        let mut payload = Vec::with_capacity(2 + hash.len() + 4 + reason.len());
        payload.extend_from_slice(&(hash.len() as u16).to_be_bytes());
        payload.extend_from_slice(hash);
        payload.extend_from_slice(&value.to_be_bytes());
        payload.extend_from_slice(reason);

        let content_hash = payload.sha256().to_vec();
        Self {
            receiver: PeerRole::Requester,
            sender,
            kind: MessageKind::PrintResult,
            content_hash,
            payload,
        }
    }

    /// Acknowledgement of `referenced`. Its own hash is the digest of the referenced hash.
    pub fn ack(receiver: PeerRole, sender: Identifier, referenced: &Message) -> Self {
        let hash = referenced.content_hash();
        let mut payload = Vec::with_capacity(2 + hash.len());
        payload.extend_from_slice(&(hash.len() as u16).to_be_bytes());
        payload.extend_from_slice(hash);

        let content_hash = hash.sha256().to_vec();
        Self { receiver, sender, kind: MessageKind::Ack, content_hash, payload }
    }
}

/// Decoded body of a `PrintResult`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultBody {
    pub request_hash: Vec<u8>,
    pub outcome: Result<i32, String>,
}

impl fmt::Display for ResultBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(value) => write!(f, "{}", value),
            Err(reason) => write!(f, "error: {}", reason),
        }
    }
}

impl Message {
    pub fn identified_role(&self) -> Result<PeerRole, ProtocolError> {
        self.expect_kind(MessageKind::Identification, "not an identification")?;
        match self.payload.as_slice() {
            [tag] => PeerRole::from_tag(*tag as u16),
            _ => Err(ProtocolError::malformed(self.kind, "identification must be one byte")),
        }
    }

    pub fn operands(&self) -> Result<(i32, i32), ProtocolError> {
        if !self.kind.is_request() {
            return Err(ProtocolError::malformed(self.kind, "not an arithmetic request"));
        }

        let mut r = SliceReader::new(&self.payload);
        let lhs = r.read_i32_be("lhs").map_err(|_| self.short_payload())?;
        let rhs = r.read_i32_be("rhs").map_err(|_| self.short_payload())?;
        if r.remaining() != 0 {
            return Err(ProtocolError::malformed(self.kind, "trailing operand bytes"));
        }
        Ok((lhs, rhs))
    }

    pub fn result_body(&self) -> Result<ResultBody, ProtocolError> {
        self.expect_kind(MessageKind::PrintResult, "not a result")?;

        let mut r = SliceReader::new(&self.payload);
        let request_hash = r.read_u16_prefixed("request hash").map_err(|_| self.short_payload())?;
        let value = r.read_i32_be("result").map_err(|_| self.short_payload())?;
        let reason = r.read_rest();

        let outcome = if reason.is_empty() {
            Ok(value)
        } else {
            Err(String::from_utf8_lossy(reason).into_owned())
        };
        Ok(ResultBody { request_hash: request_hash.to_vec(), outcome })
    }

    pub fn acked_hash(&self) -> Result<&[u8], ProtocolError> {
        self.expect_kind(MessageKind::Ack, "not an ack")?;

        let mut r = SliceReader::new(&self.payload);
        let hash = r.read_u16_prefixed("acked hash").map_err(|_| self.short_payload())?;
        if r.remaining() != 0 {
            return Err(ProtocolError::malformed(self.kind, "trailing ack bytes"));
        }
        Ok(hash)
    }

    #[inline]
    fn expect_kind(&self, kind: MessageKind, reason: &'static str) -> Result<(), ProtocolError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(ProtocolError::malformed(self.kind, reason))
        }
    }

    #[inline]
    fn short_payload(&self) -> ProtocolError {
        ProtocolError::malformed(self.kind, "payload too short")
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ receiver: {}, sender: {}, kind: {}, hash: {}, payload: {} bytes }}",
            self.receiver,
            self.sender.to_hex_lower(),
            self.kind,
            short_hex(&self.content_hash),
            self.payload.len(),
        )
    }
}
