// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use sha2::Digest;

pub const SHA256_LEN: usize = 32;

pub trait Sha256 {
    fn sha256(&self) -> [u8; SHA256_LEN];
}

impl<T: AsRef<[u8]>> Sha256 for T {
    #[inline]
    fn sha256(&self) -> [u8; SHA256_LEN] {
        let mut h = sha2::Sha256::new();
        h.update(self);
        h.finalize().into()
    }
}

/// Hashes several slices as if they were concatenated.
pub trait SlicesSha256 {
    fn slices_sha256(self) -> [u8; SHA256_LEN];
}

impl<T: Iterator> SlicesSha256 for T
where
    <T as Iterator>::Item: AsRef<[u8]>,
{
    #[inline]
    fn slices_sha256(self) -> [u8; SHA256_LEN] {
        let mut h = sha2::Sha256::new();
        self.for_each(|s| h.update(s));

        h.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToHex;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            b"abc".sha256().to_hex_lower(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn slices_match_concatenation() {
        let joined = b"hello world".sha256();
        let sliced = [&b"hello"[..], &b" "[..], &b"world"[..]].iter().slices_sha256();
        assert_eq!(joined, sliced);
    }
}
