// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

pub use hex::{FromHex, FromHexError};

pub trait ToHex {
    fn to_hex_lower(&self) -> String;

    fn to_hex_upper(&self) -> String;
}

impl<T: AsRef<[u8]>> ToHex for T {
    #[inline]
    fn to_hex_lower(&self) -> String {
        hex::encode(self)
    }

    #[inline]
    fn to_hex_upper(&self) -> String {
        hex::encode_upper(self)
    }
}

/// Short lowercase hex prefix, for log lines that would otherwise carry a full digest.
#[inline]
pub fn short_hex(data: &[u8]) -> String {
    let n = core::cmp::min(data.len(), 8);
    hex::encode(&data[..n])
}
