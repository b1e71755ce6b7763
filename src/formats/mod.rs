//! Container-specific parsing
//!
//! Each container (JPEG, BMFF) exposes a pure cursor-stepping function plus an
//! iterator over it, so every step can be inspected on its own.

use byteorder::{BigEndian, ByteOrder};

pub mod bmff_io;
pub mod jpeg_io;

/// Read a big-endian `u16` at `offset`, if the buffer is long enough
pub(crate) fn read_u16_be(buf: &[u8], offset: usize) -> Option<u16> {
    let end = offset.checked_add(2)?;
    buf.get(offset..end).map(BigEndian::read_u16)
}

/// Read a big-endian `u32` at `offset`, if the buffer is long enough
pub(crate) fn read_u32_be(buf: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    buf.get(offset..end).map(BigEndian::read_u32)
}

/// Read a big-endian `u64` at `offset`, if the buffer is long enough
pub(crate) fn read_u64_be(buf: &[u8], offset: usize) -> Option<u64> {
    let end = offset.checked_add(8)?;
    buf.get(offset..end).map(BigEndian::read_u64)
}
