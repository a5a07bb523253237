// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

//! Shared primitives for the cellmesh crates: SHA-256 helpers, peer
//! identifiers and the big-endian byte reader used by the wire codec.

pub mod encoding;
pub mod hash;
pub mod identifier;

pub use encoding::*;
pub use hash::*;
pub use identifier::*;
