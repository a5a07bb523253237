// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use cellmesh_base::Identifier;

use crate::message::{Message, MessageKind, PeerRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    /// Dialer: identifies first, then waits for the peer.
    Outbound,

    /// Acceptor: waits for the peer, then replies addressed to the learned role.
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandshakeState {
    AwaitingRemoteIdentification,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("handshake: unexpected message {0}")]
    Unexpected(MessageKind),

    #[error("handshake: malformed identification")]
    MalformedIdentification,

    #[error("handshake: expected a {expected} peer, got {actual}")]
    UnexpectedRole { expected: PeerRole, actual: PeerRole },

    #[error("handshake: already completed")]
    AlreadyCompleted,
}

/// Identification exchange. Dialers always dial nodes, so an outbound
/// identification is addressed to `PeerRole::Node`.
#[derive(Debug, Clone)]
pub struct HandshakeMachine {
    role: HandshakeRole,
    own_role: PeerRole,
    own_id: Identifier,
    expected: Option<PeerRole>,
    state: HandshakeState,
    remote: Option<(PeerRole, Identifier)>,
}

impl HandshakeMachine {
    pub fn new(role: HandshakeRole, own_role: PeerRole, own_id: Identifier) -> Self {
        Self {
            role,
            own_role,
            own_id,
            expected: None,
            state: HandshakeState::AwaitingRemoteIdentification,
            remote: None,
        }
    }

    /// Rejects peers identifying with any other role.
    pub fn expecting(mut self, expected: PeerRole) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn start(&self) -> Option<Message> {
        match self.role {
            HandshakeRole::Outbound => Some(Message::identify(self.own_role, self.own_id, PeerRole::Node)),
            HandshakeRole::Inbound => None,
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self.state, HandshakeState::Completed)
    }

    #[inline]
    pub fn remote_role(&self) -> Option<PeerRole> {
        self.remote.map(|(role, _)| role)
    }

    #[inline]
    pub fn remote_id(&self) -> Option<Identifier> {
        self.remote.map(|(_, id)| id)
    }

    /// Feeds the first frame from the peer. Returns the reply to send, if any.
    pub fn on_message(&mut self, message: &Message) -> Result<Option<Message>, HandshakeError> {
        if self.is_complete() {
            return Err(HandshakeError::AlreadyCompleted);
        }
        if message.kind() != MessageKind::Identification {
            return Err(HandshakeError::Unexpected(message.kind()));
        }

        let actual = message
            .identified_role()
            .map_err(|_| HandshakeError::MalformedIdentification)?;
        if let Some(expected) = self.expected {
            if expected != actual {
                return Err(HandshakeError::UnexpectedRole { expected, actual });
            }
        }

        self.remote = Some((actual, *message.sender()));
        self.state = HandshakeState::Completed;
        match self.role {
            HandshakeRole::Inbound => Ok(Some(Message::identify(self.own_role, self.own_id, actual))),
            HandshakeRole::Outbound => Ok(None),
        }
    }
}
