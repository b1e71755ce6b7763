//! Test utilities for building synthetic fixtures.
//!
//! Motion Photo inputs are small and structural, so fixtures are built in
//! memory instead of being read from disk:
//! - [`JpegBuilder`]: baseline JPEG marker layout with controllable scan data
//!   and trailing bytes
//! - [`Mp4Builder`]: top-level BMFF boxes (`ftyp`, `moov/mvhd`, `mdat` with
//!   32-bit, 64-bit and to-end sizes)
//!
//! None of the images decode to real pixels; only the container structure is
//! meaningful.
//!
//! # Usage
//!
//! ```
//! use motion_photo::test_utils::*;
//!
//! let jpeg = JpegBuilder::new().app0_jfif().dqt().sof0().dht().pad_to(1200).build();
//! assert_eq!(jpeg.len(), 1200);
//!
//! let video = sample_video(2, 300);
//! assert_eq!(&video[4..8], b"ftyp");
//! ```

use crate::formats::jpeg_io::XMP_SIGNATURE;

const SOS_HEADER: [u8; 10] = [
    0xFF, 0xDA, 0x00, 0x08, // SOS, length 8
    0x01, // one component
    0x01, 0x00, // component 1, tables 0/0
    0x00, 0x3F, 0x00, // spectral selection 0..63, no approximation
];

/// Builds a JPEG marker layout: SOI, header segments, SOS, scan data, EOI, trailer
#[derive(Debug, Clone, Default)]
pub struct JpegBuilder {
    header: Vec<u8>,
    scan: Vec<u8>,
    trailer: Vec<u8>,
    pad_to: Option<usize>,
}

impl JpegBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a marker segment with a correct length field
    pub fn segment(mut self, marker: u8, payload: &[u8]) -> Self {
        self.header.extend_from_slice(&[0xFF, marker]);
        self.header
            .extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        self.header.extend_from_slice(payload);
        self
    }

    /// Append raw bytes to the header region (fill bytes, broken markers, ...)
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.header.extend_from_slice(bytes);
        self
    }

    /// APP0 JFIF 1.01 segment
    pub fn app0_jfif(self) -> Self {
        self.segment(0xE0, b"JFIF\0\x01\x01\x00\x00\x01\x00\x01\x00\x00")
    }

    /// APP1 XMP segment
    pub fn xmp(self, xml: &str) -> Self {
        self.segment(0xE1, &xmp_payload(xml))
    }

    /// Quantization table 0 with values 1..=64
    pub fn dqt(self) -> Self {
        let mut payload = vec![0x00];
        payload.extend(1..=64u8);
        self.segment(0xDB, &payload)
    }

    /// Baseline frame header, 16x16, one component
    pub fn sof0(self) -> Self {
        self.segment(0xC0, &[0x08, 0x00, 0x10, 0x00, 0x10, 0x01, 0x01, 0x11, 0x00])
    }

    /// DC Huffman table 0 with a single one-bit code
    pub fn dht(self) -> Self {
        let mut payload = vec![0x00, 0x01];
        payload.extend_from_slice(&[0u8; 15]);
        payload.push(0x00);
        self.segment(0xC4, &payload)
    }

    /// Entropy-coded bytes between the SOS header and EOI
    pub fn scan_data(mut self, data: &[u8]) -> Self {
        self.scan.extend_from_slice(data);
        self
    }

    /// Bytes appended after EOI
    pub fn trailer(mut self, data: &[u8]) -> Self {
        self.trailer.extend_from_slice(data);
        self
    }

    /// Pad the scan data so the image (without trailer) is exactly `len` bytes
    pub fn pad_to(mut self, len: usize) -> Self {
        self.pad_to = Some(len);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&SOS_HEADER);
        out.extend_from_slice(&self.scan);
        if let Some(len) = self.pad_to {
            let missing = len.saturating_sub(out.len() + 2);
            out.extend((0..missing).map(|i| 0x20 + (i % 0x40) as u8));
        }
        out.extend_from_slice(&[0xFF, 0xD9]);
        out.extend_from_slice(&self.trailer);
        out
    }
}

/// XMP namespace header followed by `xml`, as found in an APP1 payload
pub fn xmp_payload(xml: &str) -> Vec<u8> {
    let mut payload = XMP_SIGNATURE.to_vec();
    payload.extend_from_slice(xml.as_bytes());
    payload
}

/// A small JPEG with stuffed bytes and a restart marker in its scan data
pub fn sample_jpeg() -> Vec<u8> {
    JpegBuilder::new()
        .app0_jfif()
        .dqt()
        .sof0()
        .dht()
        .scan_data(&[0x12, 0x34, 0xFF, 0x00, 0x56, 0xFF, 0xD0, 0x78, 0x9A, 0xFF, 0x00])
        .build()
}

/// A BMFF box with a 32-bit size
pub fn bmff_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(fourcc);
    out.extend_from_slice(payload);
    out
}

/// A BMFF box with size field 1 and a 64-bit size
pub fn bmff_large_box(fourcc: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = 1u32.to_be_bytes().to_vec();
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&((payload.len() + 16) as u64).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Movie header box, version 0
pub fn mvhd_v0(timescale: u32, duration: u32) -> Vec<u8> {
    let mut payload = vec![0u8; 4]; // version 0, flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // creation time
    payload.extend_from_slice(&0u32.to_be_bytes()); // modification time
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&duration.to_be_bytes());
    payload.extend_from_slice(&movie_header_tail());
    bmff_box(b"mvhd", &payload)
}

/// Movie header box, version 1
pub fn mvhd_v1(timescale: u32, duration: u64) -> Vec<u8> {
    let mut payload = vec![1u8, 0, 0, 0]; // version 1, flags
    payload.extend_from_slice(&0u64.to_be_bytes()); // creation time
    payload.extend_from_slice(&0u64.to_be_bytes()); // modification time
    payload.extend_from_slice(&timescale.to_be_bytes());
    payload.extend_from_slice(&duration.to_be_bytes());
    payload.extend_from_slice(&movie_header_tail());
    bmff_box(b"mvhd", &payload)
}

// rate, volume, reserved, unity matrix, pre_defined, next_track_ID
fn movie_header_tail() -> Vec<u8> {
    let mut tail = Vec::with_capacity(80);
    tail.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    tail.extend_from_slice(&0x0100u16.to_be_bytes());
    tail.extend_from_slice(&[0u8; 10]);
    for value in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        tail.extend_from_slice(&value.to_be_bytes());
    }
    tail.extend_from_slice(&[0u8; 24]);
    tail.extend_from_slice(&2u32.to_be_bytes());
    tail
}

/// Builds a sequence of top-level BMFF boxes
#[derive(Debug, Clone, Default)]
pub struct Mp4Builder {
    data: Vec<u8>,
}

impl Mp4Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ftyp` box with brand `isom`
    pub fn ftyp(self) -> Self {
        self.raw(&bmff_box(b"ftyp", b"isom\0\0\x02\0isomiso2mp41"))
    }

    /// `moov` box holding the given child boxes
    pub fn moov(self, children: &[Vec<u8>]) -> Self {
        let payload = children.concat();
        self.raw(&bmff_box(b"moov", &payload))
    }

    /// `mdat` box with a 32-bit size
    pub fn mdat(self, payload: &[u8]) -> Self {
        self.raw(&bmff_box(b"mdat", payload))
    }

    /// `mdat` box with a 64-bit size
    pub fn mdat_large(self, payload: &[u8]) -> Self {
        self.raw(&bmff_large_box(b"mdat", payload))
    }

    /// `mdat` box with size 0, running to the end of the file
    pub fn mdat_to_end(self, payload: &[u8]) -> Self {
        let mut mdat = 0u32.to_be_bytes().to_vec();
        mdat.extend_from_slice(b"mdat");
        mdat.extend_from_slice(payload);
        self.raw(&mdat)
    }

    /// Append raw bytes
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// An MP4 of `seconds` duration (timescale 1000) whose `mdat` payload is
/// `mdat_len` bytes and repeatedly contains `FF D9`
pub fn sample_video(seconds: u32, mdat_len: usize) -> Vec<u8> {
    let payload: Vec<u8> = (0..mdat_len)
        .map(|i| match i % 7 {
            3 => 0xFF,
            4 => 0xD9,
            n => n as u8,
        })
        .collect();
    Mp4Builder::new()
        .ftyp()
        .moov(&[mvhd_v0(1000, seconds * 1000)])
        .mdat(&payload)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_builder_pad_to() {
        let jpeg = JpegBuilder::new().app0_jfif().dqt().sof0().dht().pad_to(1200).build();
        assert_eq!(jpeg.len(), 1200);
        assert!(jpeg.ends_with(&[0xFF, 0xD9]));
    }

    #[test]
    fn test_jpeg_builder_trailer() {
        let jpeg = JpegBuilder::new().dqt().trailer(&[1, 2, 3]).build();
        assert!(jpeg.ends_with(&[0xFF, 0xD9, 1, 2, 3]));
    }

    #[test]
    fn test_mvhd_sizes() {
        assert_eq!(mvhd_v0(1, 1).len(), 8 + 100);
        assert_eq!(mvhd_v1(1, 1).len(), 8 + 112);
    }

    #[test]
    fn test_sample_video_contains_ffd9() {
        let video = sample_video(1, 64);
        assert!(video.windows(2).any(|w| w == [0xFF, 0xD9]));
    }
}
