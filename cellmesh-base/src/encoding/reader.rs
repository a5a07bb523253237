// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("decode: unexpected eof reading {field}, needed {needed} remaining {remaining}")]
    UnexpectedEof {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
}

/// Big-endian reader over an in-memory byte slice.
pub struct SliceReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> SliceReader<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    #[inline]
    pub fn consumed(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn read_slice(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof {
                field,
                needed: len,
                remaining: self.remaining(),
            });
        }

        let start = self.offset;
        self.offset += len;
        Ok(&self.buf[start..self.offset])
    }

    pub fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(field, N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        self.read_array::<1>(field).map(|b| b[0])
    }

    #[inline]
    pub fn read_u16_be(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        self.read_array(field).map(u16::from_be_bytes)
    }

    #[inline]
    pub fn read_u32_be(&mut self, field: &'static str) -> Result<u32, DecodeError> {
        self.read_array(field).map(u32::from_be_bytes)
    }

    #[inline]
    pub fn read_i32_be(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        self.read_array(field).map(i32::from_be_bytes)
    }

    /// Reads a u16 length prefix followed by that many bytes.
    pub fn read_u16_prefixed(&mut self, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u16_be(field)? as usize;
        self.read_slice(field, len)
    }

    /// Takes everything not consumed yet.
    #[inline]
    pub fn read_rest(&mut self) -> &'a [u8] {
        let start = self.offset;
        self.offset = self.buf.len();
        &self.buf[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields() {
        let buf = [0x00, 0x02, 0xff, 0xff, 0xff, 0xfe, 0x00, 0x01, 0xaa];
        let mut r = SliceReader::new(&buf);
        assert_eq!(r.read_u16_be("a").unwrap(), 2);
        assert_eq!(r.read_i32_be("b").unwrap(), -2);
        assert_eq!(r.read_u16_prefixed("c").unwrap(), &[0xaa]);
        assert_eq!(r.remaining(), 0);
        assert_eq!(r.consumed(), buf.len());
    }

    #[test]
    fn short_read_is_reported() {
        let buf = [0x00, 0x05, 0x01];
        let mut r = SliceReader::new(&buf);
        let err = r.read_u16_prefixed("hash").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEof { field: "hash", needed: 5, remaining: 1 }
        );
    }
}
