// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

//! Peer identifiers.
//!
//! An identifier is 8 bytes: the first 6 bytes of a SHA-256 digest over the
//! host name followed by the big-endian port. [`create_identifier`] is the
//! deterministic form; [`create_session_identifier`] folds a random startup
//! nonce into the digest so that two processes on the same host and port
//! still get distinct identifiers.

use crate::{SlicesSha256, Sha256};

pub const IDENTIFIER_LEN: usize = 8;

const HOST_PREFIX_LEN: usize = 6;

pub type Identifier = [u8; IDENTIFIER_LEN];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("identifier: port {0} is out of range [0, 65535]")]
    PortOutOfRange(u32),
}

pub fn create_identifier(host: &str, port: u32) -> Result<Identifier, IdentifierError> {
    let port = check_port(port)?;
    Ok(compose(&host.sha256(), port))
}

pub fn create_session_identifier(host: &str, port: u32) -> Result<Identifier, IdentifierError> {
    let port = check_port(port)?;
    let nonce: u64 = rand::random();
    let digest = [host.as_bytes(), &nonce.to_be_bytes()[..]].iter().slices_sha256();
    Ok(compose(&digest, port))
}

#[inline]
fn check_port(port: u32) -> Result<u16, IdentifierError> {
    u16::try_from(port).map_err(|_| IdentifierError::PortOutOfRange(port))
}

#[inline]
fn compose(digest: &[u8], port: u16) -> Identifier {
    let mut id = [0u8; IDENTIFIER_LEN];
    id[..HOST_PREFIX_LEN].copy_from_slice(&digest[..HOST_PREFIX_LEN]);
    id[HOST_PREFIX_LEN..].copy_from_slice(&port.to_be_bytes());
    id
}
