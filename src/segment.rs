//! Segment types and location tracking

/// A byte range in a buffer (offset and size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    /// Offset from start of buffer
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
}

impl ByteRange {
    /// Create a new byte range
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Get the end offset of this range (exclusive)
    pub fn end_offset(&self) -> usize {
        self.offset + self.size
    }

    /// Borrow the bytes covered by this range, if it lies within `buf`
    pub fn slice<'a>(&self, buf: &'a [u8]) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(self.size)?;
        buf.get(self.offset..end)
    }
}

/// A JPEG marker found while scanning
///
/// `offset` points at the `0xFF` byte that introduces `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegMarker {
    /// Second byte of the marker (e.g. `0xE1` for APP1)
    pub code: u8,
    /// Offset of the `0xFF` prefix byte
    pub offset: usize,
}

impl JpegMarker {
    pub fn new(code: u8, offset: usize) -> Self {
        Self { code, offset }
    }

    /// Markers that stand alone, without a length field
    pub fn is_standalone(&self) -> bool {
        matches!(self.code, 0x01 | 0xD0..=0xD9)
    }

    /// Human-readable label for the marker
    pub fn label(&self) -> &'static str {
        match self.code {
            0xD8 => "SOI",
            0xD9 => "EOI",
            0xDA => "SOS",
            0xDB => "DQT",
            0xC0 => "SOF0",
            0xC1 => "SOF1",
            0xC2 => "SOF2",
            0xC4 => "DHT",
            0xDD => "DRI",
            0xFE => "COM",
            0xD0..=0xD7 => "RST",
            0xE0 => "APP0",
            0xE1 => "APP1",
            0xE2 => "APP2",
            0xEB => "APP11",
            0xE3..=0xEF => "APPn",
            _ => "OTHER",
        }
    }
}

/// A JPEG marker segment
///
/// Standalone markers (SOI, EOI, RSTn) carry neither a length field nor a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// The marker introducing this segment
    pub marker: JpegMarker,
    /// Declared length field (includes its own two bytes)
    pub length: Option<u16>,
    /// Payload following the length field, always within the scanned buffer
    pub payload: Option<ByteRange>,
}

impl Segment {
    /// Total bytes occupied by the segment, marker included
    pub fn total_size(&self) -> usize {
        match self.length {
            Some(len) => 2 + len as usize,
            None => 2,
        }
    }

    /// Offset one past the last byte of the segment
    pub fn end_offset(&self) -> usize {
        self.marker.offset + self.total_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_slice_bounds() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(ByteRange::new(1, 2).slice(&buf), Some(&buf[1..3]));
        assert_eq!(ByteRange::new(3, 2).slice(&buf), None);
        assert_eq!(ByteRange::new(usize::MAX, 2).slice(&buf), None);
    }

    #[test]
    fn test_standalone_markers() {
        assert!(JpegMarker::new(0xD8, 0).is_standalone());
        assert!(JpegMarker::new(0xD3, 0).is_standalone());
        assert!(!JpegMarker::new(0xDA, 0).is_standalone());
        assert!(!JpegMarker::new(0xE1, 0).is_standalone());
    }

    #[test]
    fn test_segment_size() {
        let seg = Segment {
            marker: JpegMarker::new(0xE0, 2),
            length: Some(16),
            payload: Some(ByteRange::new(6, 14)),
        };
        assert_eq!(seg.total_size(), 18);
        assert_eq!(seg.end_offset(), 20);
    }
}
