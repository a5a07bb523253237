// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

//! Wire protocol, reliability engine and relay node of a cellmesh overlay.
//!
//! Relay nodes accept cells (servers and requesters) and other nodes, and
//! forward every frame between the two groups. Cells keep per-kind outgoing
//! queues and resend until the matching Ack arrives.

pub use {
    cell::*, codec::*, connection::*, dispatch::*, error::*, handshake::*, message::*, node::*,
    registry::*, service::*,
};

pub mod cell;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod message;
pub mod node;
pub mod registry;
pub mod service;
