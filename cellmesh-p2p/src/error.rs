//! Error types for cellmesh P2P operations.

use std::io;

use cellmesh_base::{DecodeError, IdentifierError};
use thiserror::Error;

use crate::handshake::HandshakeError;
use crate::message::MessageKind;

/// Malformed frames and payloads. Fatal to the connection they arrive on.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Peer-role tag outside the known set.
    #[error("protocol: unknown peer role tag {0}")]
    UnknownRole(u16),

    /// Message-kind tag outside the known set.
    #[error("protocol: unknown message kind tag {0}")]
    UnknownKind(u16),

    /// Stream or buffer ended inside a declared field.
    #[error("protocol: short read: {0}")]
    ShortRead(#[from] DecodeError),

    /// Declared payload length above the frame limit.
    #[error("protocol: payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    /// Content hash does not fit its 2-byte length prefix.
    #[error("protocol: content hash of {0} bytes does not fit the length prefix")]
    HashTooLong(usize),

    /// Bytes left over after a complete frame.
    #[error("protocol: {0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Payload does not match the layout of its kind.
    #[error("protocol: malformed {kind} payload: {reason}")]
    MalformedPayload {
        kind: MessageKind,
        reason: &'static str,
    },

    /// Transport failure while reading or writing frames.
    #[error("protocol: io: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(kind: MessageKind, reason: &'static str) -> Self {
        Self::MalformedPayload { kind, reason }
    }
}

/// Errors surfaced by nodes, cells and their loops.
#[derive(Error, Debug)]
pub enum P2pError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("p2p: io: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("p2p: no free port among candidates {0:?}")]
    NoFreePort(Vec<u16>),

    #[error("p2p: giving up after {attempts} connection attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("p2p: connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

/// Result type for P2P operations.
pub type P2pResult<T> = Result<T, P2pError>;

/// Failure to hand a frame to a connection's writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("send: channel has fulled")]
    Fulled,

    #[error("send: channel has closed")]
    Closed,
}

/// Arithmetic evaluation failures, reported back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("overflow evaluating {0} {1} {2}")]
    Overflow(i32, &'static str, i32),

    #[error("{0} is not an arithmetic request")]
    NotArithmetic(MessageKind),
}
