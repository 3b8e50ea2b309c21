//! Bounds-checked little-endian reads.
//!
//! The mashup envelope and the binary record parts (`Report/Metadata`,
//! `Settings`) are sequences of little-endian integers and `u32`-prefixed
//! byte ranges. Reads never panic: a short buffer is an [`BinaryError`],
//! which the package layer reports as a corrupt part.

use std::mem::size_of;
use zerocopy::{F64, FromBytes, I32, I64, LE, U16, U32};

#[derive(Debug, Clone, thiserror::Error)]
pub enum BinaryError {
    /// The buffer ends before `needed` bytes.
    #[error("truncated data: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("range of {0} bytes does not fit a u32 length prefix")]
    RangeTooLong(usize),
}

pub type BinaryResult<T> = Result<T, BinaryError>;

fn window(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(BinaryError::Truncated {
            needed: offset.saturating_add(len),
            available: data.len(),
        })
}

macro_rules! le_reader {
    ($(#[$doc:meta])* $name:ident, $wire:ty, $native:ty) => {
        $(#[$doc])*
        #[inline]
        pub fn $name(data: &[u8], offset: usize) -> BinaryResult<$native> {
            let bytes = window(data, offset, size_of::<$native>())?;
            // The window has exactly the wire size, so the conversion cannot fail
            Ok(<$wire>::read_from_bytes(bytes).map_or(<$native>::default(), |v| v.get()))
        }
    };
}

le_reader!(read_u16_le, U16<LE>, u16);
le_reader!(read_u32_le, U32<LE>, u32);
le_reader!(
    /// Payload of an `Int32` record.
    read_i32_le, I32<LE>, i32
);
le_reader!(
    /// Payload of an `Int64` record.
    read_i64_le, I64<LE>, i64
);
le_reader!(
    /// Payload of a `Double` record.
    ///
    /// ```
    /// use pbixproj::common::binary::read_f64_le;
    /// assert_eq!(read_f64_le(&1.5f64.to_le_bytes(), 0).unwrap(), 1.5);
    /// ```
    read_f64_le, F64<LE>, f64
);

/// Forward-only reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes and move past them.
    pub fn take(&mut self, len: usize) -> BinaryResult<&'a [u8]> {
        let bytes = window(self.data, self.pos, len)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> BinaryResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> BinaryResult<u16> {
        read_u16_le(self.take(2)?, 0)
    }

    pub fn read_u32(&mut self) -> BinaryResult<u32> {
        read_u32_le(self.take(4)?, 0)
    }

    /// A `u32` length, then that many bytes.
    pub fn read_length_prefixed(&mut self) -> BinaryResult<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }
}

/// Inverse of [`ByteCursor::read_length_prefixed`].
pub fn write_length_prefixed(out: &mut Vec<u8>, bytes: &[u8]) -> BinaryResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| BinaryError::RangeTooLong(bytes.len()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_payloads() {
        let data = [0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_u32_le(&data, 0).unwrap(), 1);
        assert_eq!(read_i32_le(&data, 4).unwrap(), -1);
        assert_eq!(read_i64_le(&data, 0).unwrap(), -4294967295);
    }

    #[test]
    fn test_truncated() {
        let data = [0x01, 0x02];
        assert!(matches!(
            read_u32_le(&data, 0),
            Err(BinaryError::Truncated { needed: 4, available: 2 })
        ));
        assert!(read_u16_le(&data, usize::MAX).is_err());
    }

    #[test]
    fn test_ranges_in_sequence() {
        let mut buf = Vec::new();
        write_length_prefixed(&mut buf, b"PK").unwrap();
        write_length_prefixed(&mut buf, b"").unwrap();
        buf.push(7);

        let mut cursor = ByteCursor::new(&buf);
        assert_eq!(cursor.read_length_prefixed().unwrap(), b"PK");
        assert_eq!(cursor.read_length_prefixed().unwrap(), b"");
        assert_eq!(cursor.remaining(), 1);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert!(cursor.is_at_end());
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn test_range_longer_than_buffer() {
        let mut cursor = ByteCursor::new(&[0x10, 0x00, 0x00, 0x00, 0x01]);
        assert!(cursor.read_length_prefixed().is_err());
    }
}
