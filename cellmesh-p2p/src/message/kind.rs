// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

/// Message kind. The derived order is the dispatcher's queue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    Identification,
    Addition,
    Subtraction,
    Multiplication,
    Division,
    PrintResult,
    Ack,
}

impl MessageKind {
    pub const REQUESTS: [MessageKind; 4] = [
        MessageKind::Addition,
        MessageKind::Subtraction,
        MessageKind::Multiplication,
        MessageKind::Division,
    ];

    #[inline]
    pub const fn to_tag(self) -> u16 {
        match self {
            MessageKind::Identification => 0,
            MessageKind::Addition => 1,
            MessageKind::Subtraction => 2,
            MessageKind::Multiplication => 3,
            MessageKind::Division => 4,
            MessageKind::PrintResult => 5,
            MessageKind::Ack => 99,
        }
    }

    pub fn from_tag(tag: u16) -> Result<Self, ProtocolError> {
        match tag {
            0 => Ok(MessageKind::Identification),
            1 => Ok(MessageKind::Addition),
            2 => Ok(MessageKind::Subtraction),
            3 => Ok(MessageKind::Multiplication),
            4 => Ok(MessageKind::Division),
            5 => Ok(MessageKind::PrintResult),
            99 => Ok(MessageKind::Ack),
            _ => Err(ProtocolError::UnknownKind(tag)),
        }
    }

    /// Arithmetic request kinds, answered by servers.
    #[inline]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            MessageKind::Addition
                | MessageKind::Subtraction
                | MessageKind::Multiplication
                | MessageKind::Division
        )
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Identification => write!(f, "Identification (0)"),
            MessageKind::Addition => write!(f, "Addition (1)"),
            MessageKind::Subtraction => write!(f, "Subtraction (2)"),
            MessageKind::Multiplication => write!(f, "Multiplication (3)"),
            MessageKind::Division => write!(f, "Division (4)"),
            MessageKind::PrintResult => write!(f, "PrintResult (5)"),
            MessageKind::Ack => write!(f, "Ack (99)"),
        }
    }
}

/// Arithmetic operation a requester can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operation {
    #[inline]
    pub const fn kind(self) -> MessageKind {
        match self {
            Operation::Add => MessageKind::Addition,
            Operation::Sub => MessageKind::Subtraction,
            Operation::Mul => MessageKind::Multiplication,
            Operation::Div => MessageKind::Division,
        }
    }

    #[inline]
    pub const fn from_kind(kind: MessageKind) -> Option<Self> {
        match kind {
            MessageKind::Addition => Some(Operation::Add),
            MessageKind::Subtraction => Some(Operation::Sub),
            MessageKind::Multiplication => Some(Operation::Mul),
            MessageKind::Division => Some(Operation::Div),
            _ => None,
        }
    }

    #[inline]
    pub const fn symbol(self) -> &'static str {
        match self {
            Operation::Add => "+",
            Operation::Sub => "-",
            Operation::Mul => "*",
            Operation::Div => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{0}', expected one of + - * /")]
pub struct ParseOperationError(pub String);

impl FromStr for Operation {
    type Err = ParseOperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Operation::Add),
            "-" => Ok(Operation::Sub),
            "*" => Ok(Operation::Mul),
            "/" => Ok(Operation::Div),
            other => Err(ParseOperationError(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
