// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::fmt;

use crate::ProtocolError;

/// Class of participant, learned through the identification handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeerRole {
    Node,
    Server,
    Requester,
}

impl PeerRole {
    #[inline]
    pub const fn to_tag(self) -> u16 {
        match self {
            PeerRole::Node => 0,
            PeerRole::Server => 1,
            PeerRole::Requester => 2,
        }
    }

    pub fn from_tag(tag: u16) -> Result<Self, ProtocolError> {
        match tag {
            0 => Ok(PeerRole::Node),
            1 => Ok(PeerRole::Server),
            2 => Ok(PeerRole::Requester),
            _ => Err(ProtocolError::UnknownRole(tag)),
        }
    }

    #[inline]
    pub const fn is_node(self) -> bool {
        matches!(self, PeerRole::Node)
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Node => write!(f, "Node"),
            PeerRole::Server => write!(f, "Server"),
            PeerRole::Requester => write!(f, "Requester"),
        }
    }
}
