//! JPEG marker segment walking
//!
//! The header region of a JPEG (everything between SOI and the first SOS) is a
//! sequence of marker segments, each `FF xx` followed by a big-endian length
//! that counts itself. After SOS comes entropy-coded data in which `FF` bytes
//! are either stuffed (`FF 00`), restart markers (`FF D0`..`FF D7`) or real
//! markers. Only an EOI reached through that structure is trusted as the end of
//! the image; bytes appended after it (a Motion Photo's video, for instance)
//! may contain `FF D9` by coincidence.

use crate::{
    error::{Error, Result},
    formats::read_u16_be,
    segment::{ByteRange, JpegMarker, Segment},
};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

// JPEG markers
pub const SOI: u8 = 0xD8; // Start of Image
pub const EOI: u8 = 0xD9; // End of Image
pub const SOS: u8 = 0xDA; // Start of Scan (image data follows)
pub const APP1: u8 = 0xE1; // XMP / EXIF

// Restart markers, standalone and legal inside entropy-coded data
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;

/// Namespace header that opens an XMP APP1 payload
pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const MAX_MARKER_SIZE: usize = 65533; // Max payload for a JPEG marker segment

/// Check for the SOI marker at the start of the buffer
pub fn has_soi(buf: &[u8]) -> bool {
    buf.starts_with(&[0xFF, SOI])
}

/// Read the header-region segment starting at `cursor`.
///
/// Fill bytes (`FF FF ...`) ahead of the marker code are skipped. Returns the
/// segment together with the cursor of the following one, or `None` when the
/// structure is broken here: no `FF` where a marker belongs, a length field
/// below 2, or a segment running past the end of the buffer.
pub fn next_segment(buf: &[u8], cursor: usize) -> Option<(Segment, usize)> {
    if *buf.get(cursor)? != 0xFF {
        return None;
    }

    let mut pos = cursor;
    while buf.get(pos + 1) == Some(&0xFF) {
        pos += 1;
    }

    let code = *buf.get(pos + 1)?;
    if code == 0x00 {
        return None;
    }

    let marker = JpegMarker::new(code, pos);
    if marker.is_standalone() {
        let segment = Segment {
            marker,
            length: None,
            payload: None,
        };
        return Some((segment, pos + 2));
    }

    let length = read_u16_be(buf, pos + 2)?;
    if length < 2 {
        return None;
    }
    let end = pos + 2 + length as usize;
    if end > buf.len() {
        return None;
    }

    let segment = Segment {
        marker,
        length: Some(length),
        payload: Some(ByteRange::new(pos + 4, length as usize - 2)),
    };
    Some((segment, end))
}

/// Find the next real marker inside entropy-coded data, starting at `cursor`.
///
/// Stuffed bytes and restart markers are data, not markers. Returns the marker
/// and the cursor to resume scanning from.
pub fn next_entropy_marker(buf: &[u8], cursor: usize) -> Option<(JpegMarker, usize)> {
    let mut p = cursor;
    while p + 1 < buf.len() {
        if buf[p] == 0xFF {
            match buf[p + 1] {
                0x00 | RST0..=RST7 => {
                    p += 2;
                    continue;
                }
                code => return Some((JpegMarker::new(code, p), p + 1)),
            }
        }
        p += 1;
    }
    None
}

/// Iterator over the header segments of a JPEG.
///
/// Yields segments in file order and stops after yielding SOS or EOI, or at
/// the first structural anomaly. [`JpegSegments::position`] then reports
/// where the walk ended.
#[derive(Debug, Clone)]
pub struct JpegSegments<'a> {
    buf: &'a [u8],
    cursor: usize,
    finished: bool,
}

impl<'a> JpegSegments<'a> {
    /// Start walking after SOI. Fails if the buffer does not begin with SOI.
    pub fn new(buf: &'a [u8]) -> Result<Self> {
        if !has_soi(buf) {
            return Err(Error::InvalidFormat("Not a JPEG file (missing SOI)".into()));
        }
        Ok(Self {
            buf,
            cursor: 2,
            finished: false,
        })
    }

    /// Offset where the walk currently stands.
    ///
    /// After SOS or EOI this is the offset of that marker; after an anomaly it
    /// is the start of the unit that could not be read.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl Iterator for JpegSegments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        if self.finished {
            return None;
        }
        match next_segment(self.buf, self.cursor) {
            Some((segment, next)) => {
                if matches!(segment.marker.code, SOS | EOI) {
                    self.finished = true;
                    self.cursor = segment.marker.offset;
                } else {
                    self.cursor = next;
                }
                Some(segment)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// How an End-Of-Image marker was located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EoiMethod {
    /// Reached by walking segments and the entropy-coded scan
    Structural,
    /// Rightmost `FF D9` in the buffer; may sit inside unrelated data
    ReverseSearch,
}

/// Location of the End-Of-Image marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EoiLocation {
    /// Offset of the `FF` byte of `FF D9`
    pub offset: usize,
    /// How the marker was found
    pub method: EoiMethod,
}

impl EoiLocation {
    /// Offset one past the EOI marker; the length of the trimmed image
    pub fn end_offset(&self) -> usize {
        self.offset + 2
    }

    pub fn is_structural(&self) -> bool {
        self.method == EoiMethod::Structural
    }
}

/// Locate the true End-Of-Image marker.
///
/// Walks header segments to SOS and then scans the entropy-coded data for the
/// first real EOI. If the structure breaks before that, falls back to the
/// rightmost `FF D9` in the buffer and reports [`EoiMethod::ReverseSearch`].
///
/// # Errors
/// `InvalidFormat` when the buffer does not begin with SOI or no EOI exists.
pub fn find_eoi(jpeg: &[u8]) -> Result<EoiLocation> {
    let mut structural = None;
    for segment in JpegSegments::new(jpeg)? {
        match segment.marker.code {
            EOI => {
                structural = Some(segment.marker.offset);
                break;
            }
            SOS => {
                structural = segment
                    .payload
                    .and_then(|header| scan_for_eoi(jpeg, header.end_offset()));
                break;
            }
            _ => {}
        }
    }

    if let Some(offset) = structural {
        tracing::debug!(offset, "located EOI through segment structure");
        return Ok(EoiLocation {
            offset,
            method: EoiMethod::Structural,
        });
    }

    match rfind_eoi(jpeg) {
        Some(offset) => {
            tracing::warn!(
                offset,
                "EOI not reachable through segment structure, using rightmost FFD9"
            );
            Ok(EoiLocation {
                offset,
                method: EoiMethod::ReverseSearch,
            })
        }
        None => Err(Error::InvalidFormat("No End-Of-Image marker found".into())),
    }
}

/// Scan entropy-coded data from `start` for the first EOI
fn scan_for_eoi(buf: &[u8], start: usize) -> Option<usize> {
    let mut cursor = start;
    loop {
        let (marker, next) = next_entropy_marker(buf, cursor)?;
        if marker.code == EOI {
            return Some(marker.offset);
        }
        cursor = next;
    }
}

fn rfind_eoi(buf: &[u8]) -> Option<usize> {
    buf.windows(2).rposition(|pair| pair == [0xFF, EOI])
}

/// Splice `segment` into `jpeg` immediately before Start-Of-Scan.
///
/// If the header walk hits EOI, a stray SOI or a structural anomaly first, the
/// segment goes at that point instead. Every original byte is kept, in order.
///
/// # Errors
/// `InvalidFormat` when the buffer does not begin with SOI.
pub fn insert_segment_before_sos(jpeg: &[u8], segment: &[u8]) -> Result<Vec<u8>> {
    let mut segments = JpegSegments::new(jpeg)?;
    let mut insert_at = None;
    for seg in segments.by_ref() {
        if matches!(seg.marker.code, SOS | EOI | SOI) {
            insert_at = Some(seg.marker.offset);
            break;
        }
    }
    let insert_at = insert_at.unwrap_or_else(|| segments.position());
    tracing::debug!(insert_at, len = segment.len(), "inserting segment");

    let mut out = Vec::with_capacity(jpeg.len() + segment.len());
    out.extend_from_slice(&jpeg[..insert_at]);
    out.extend_from_slice(segment);
    out.extend_from_slice(&jpeg[insert_at..]);
    Ok(out)
}

/// Return the text of the first XMP APP1 segment, if any.
///
/// Only header segments are inspected. Invalid UTF-8 is replaced rather than
/// rejected. A buffer without SOI simply has no XMP.
pub fn extract_xmp(jpeg: &[u8]) -> Option<String> {
    JpegSegments::new(jpeg)
        .ok()?
        .filter(|seg| seg.marker.code == APP1)
        .filter_map(|seg| seg.payload.and_then(|range| range.slice(jpeg)))
        .find_map(|payload| payload.strip_prefix(XMP_SIGNATURE))
        .map(|xml| String::from_utf8_lossy(xml).into_owned())
}

/// Write XMP as an APP1 segment
pub fn write_xmp_segment<W: Write>(writer: &mut W, xmp: &[u8]) -> Result<()> {
    let payload_size = XMP_SIGNATURE.len() + xmp.len();

    if payload_size > MAX_MARKER_SIZE {
        return Err(Error::DataTooLarge {
            size: payload_size,
            max: MAX_MARKER_SIZE,
        });
    }

    writer.write_u8(0xFF)?;
    writer.write_u8(APP1)?;
    writer.write_u16::<BigEndian>((payload_size + 2) as u16)?;
    writer.write_all(XMP_SIGNATURE)?;
    writer.write_all(xmp)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{xmp_payload, JpegBuilder};
    use assert_matches::assert_matches;

    #[test]
    fn test_walk_minimal_jpeg() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let segments: Vec<_> = JpegSegments::new(&data).unwrap().collect();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].marker, JpegMarker::new(EOI, 2));
        assert_eq!(segments[0].payload, None);
    }

    #[test]
    fn test_walk_stops_at_sos() {
        let jpeg = JpegBuilder::new().app0_jfif().dqt().sof0().dht().build();
        let mut walker = JpegSegments::new(&jpeg).unwrap();
        let labels: Vec<_> = walker.by_ref().map(|s| s.marker.label()).collect();
        assert_eq!(labels, ["APP0", "DQT", "SOF0", "DHT", "SOS"]);
        assert_eq!(&jpeg[walker.position()..walker.position() + 2], &[0xFF, SOS]);
    }

    #[test]
    fn test_payload_ranges_stay_in_bounds() {
        let jpeg = JpegBuilder::new().app0_jfif().xmp("<x/>").dqt().build();
        for seg in JpegSegments::new(&jpeg).unwrap() {
            if let Some(range) = seg.payload {
                assert!(range.end_offset() <= jpeg.len());
                assert_eq!(range.size + 2, seg.length.unwrap() as usize);
            }
        }
    }

    #[test]
    fn test_next_segment_skips_fill_bytes() {
        let data = [0xFF, 0xD8, 0xFF, 0xFF, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB];
        let (seg, next) = next_segment(&data, 2).unwrap();
        assert_eq!(seg.marker, JpegMarker::new(0xE0, 4));
        assert_eq!(seg.payload, Some(ByteRange::new(8, 2)));
        assert_eq!(next, data.len());
    }

    #[test]
    fn test_next_segment_anomalies() {
        // not a marker
        assert!(next_segment(&[0xFF, 0xD8, 0x12, 0x34], 2).is_none());
        // length underflow
        assert!(next_segment(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x01], 2).is_none());
        // runs off the buffer
        assert!(next_segment(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x00], 2).is_none());
        // truncated length field
        assert!(next_segment(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], 2).is_none());
        // stuffed byte is not a marker
        assert!(next_segment(&[0xFF, 0xD8, 0xFF, 0x00], 2).is_none());
    }

    #[test]
    fn test_entropy_marker_skips_stuffing_and_restarts() {
        let data = [0x11, 0xFF, 0x00, 0x22, 0xFF, 0xD3, 0x33, 0xFF, 0xD9];
        let (marker, _) = next_entropy_marker(&data, 0).unwrap();
        assert_eq!(marker, JpegMarker::new(EOI, 7));
    }

    #[test]
    fn test_find_eoi_ignores_appended_ffd9() {
        let jpeg = JpegBuilder::new()
            .app0_jfif()
            .dqt()
            .sof0()
            .dht()
            .scan_data(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56])
            .trailer(&[0x00, 0xFF, 0xD9, 0x00, 0xFF, 0xD9, 0x77])
            .build();
        let eoi = find_eoi(&jpeg).unwrap();
        assert_eq!(eoi.method, EoiMethod::Structural);
        assert_eq!(&jpeg[eoi.offset..eoi.end_offset()], &[0xFF, 0xD9]);
        assert_eq!(eoi.end_offset(), jpeg.len() - 7);
    }

    #[test]
    fn test_find_eoi_before_sos() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xD9, 0xFF, 0xD9];
        let eoi = find_eoi(&data).unwrap();
        assert_eq!(eoi.offset, 6);
        assert!(eoi.is_structural());
    }

    #[test]
    fn test_find_eoi_falls_back_to_reverse_search() {
        // Garbage where a marker should be, EOI further on
        let data = [0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9, 0x03, 0xFF, 0xD9];
        let eoi = find_eoi(&data).unwrap();
        assert_eq!(eoi.method, EoiMethod::ReverseSearch);
        assert_eq!(eoi.offset, 7);
    }

    #[test]
    fn test_find_eoi_truncated_scan_falls_back() {
        let mut jpeg = JpegBuilder::new().dqt().sof0().scan_data(&[1, 2, 3]).build();
        // drop the real EOI, leave an FFD9 earlier in the header
        jpeg.truncate(jpeg.len() - 2);
        jpeg.splice(2..2, [0xFF, 0xFE, 0x00, 0x04, 0xFF, 0xD9]);
        let eoi = find_eoi(&jpeg).unwrap();
        assert_eq!(eoi.method, EoiMethod::ReverseSearch);
        assert_eq!(eoi.offset, 6);
    }

    #[test]
    fn test_find_eoi_errors() {
        assert_matches!(find_eoi(&[0x00, 0x01, 0xFF, 0xD9]), Err(Error::InvalidFormat(_)));
        assert_matches!(find_eoi(&[]), Err(Error::InvalidFormat(_)));
        assert_matches!(
            find_eoi(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xFF, 0xDB]),
            Err(Error::InvalidFormat(_))
        );
    }

    #[test]
    fn test_insert_before_sos() {
        let jpeg = JpegBuilder::new().app0_jfif().dqt().sof0().dht().build();
        let sos = jpeg.windows(2).position(|w| w == [0xFF, SOS]).unwrap();
        let seg = [0xFF, 0xE1, 0x00, 0x04, 0xAB, 0xCD];

        let out = insert_segment_before_sos(&jpeg, &seg).unwrap();
        assert_eq!(out.len(), jpeg.len() + seg.len());
        assert_eq!(&out[..sos], &jpeg[..sos]);
        assert_eq!(&out[sos..sos + seg.len()], &seg);
        assert_eq!(&out[sos + seg.len()..], &jpeg[sos..]);
    }

    #[test]
    fn test_insert_keeps_fill_bytes_before_segment() {
        let jpeg = JpegBuilder::new().dqt().raw(&[0xFF, 0xFF]).sof0().build();
        let out = insert_segment_before_sos(&jpeg, &[0xFF, 0xFE, 0x00, 0x02]).unwrap();
        assert_eq!(out.len(), jpeg.len() + 4);
        let inserted = out.windows(4).position(|w| w == [0xFF, 0xFE, 0x00, 0x02]).unwrap();
        assert_eq!(&out[inserted + 4..inserted + 6], &[0xFF, SOS]);
    }

    #[test]
    fn test_insert_at_anomaly() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0x42, 0x42];
        let out = insert_segment_before_sos(&data, &[0xEE]).unwrap();
        assert_eq!(out, [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x02, 0xEE, 0x42, 0x42]);
    }

    #[test]
    fn test_insert_requires_soi() {
        assert_matches!(
            insert_segment_before_sos(&[0x89, 0x50, 0x4E, 0x47], &[0xFF]),
            Err(Error::InvalidFormat(_))
        );
    }

    #[test]
    fn test_extract_xmp() {
        let jpeg = JpegBuilder::new()
            .app0_jfif()
            .segment(APP1, b"Exif\0\0MM\0*")
            .xmp("<x:xmpmeta>first</x:xmpmeta>")
            .xmp("<x:xmpmeta>second</x:xmpmeta>")
            .dqt()
            .build();
        assert_eq!(extract_xmp(&jpeg).as_deref(), Some("<x:xmpmeta>first</x:xmpmeta>"));
    }

    #[test]
    fn test_extract_xmp_absent_or_malformed() {
        let jpeg = JpegBuilder::new().app0_jfif().dqt().build();
        assert_eq!(extract_xmp(&jpeg), None);
        assert_eq!(extract_xmp(b"not a jpeg"), None);

        // XMP after SOS is not header metadata
        let mut late = JpegBuilder::new().dqt().build();
        late.truncate(late.len() - 2);
        late.extend_from_slice(&[0xFF, APP1, 0x00, 0x08]);
        late.extend_from_slice(&xmp_payload("<a/>")[..6]);
        assert_eq!(extract_xmp(&late), None);
    }

    #[test]
    fn test_extract_xmp_lossy_decode() {
        let mut payload = XMP_SIGNATURE.to_vec();
        payload.extend_from_slice(b"<a>\xFF\xFE</a>");
        let jpeg = JpegBuilder::new().segment(APP1, &payload).build();
        let xmp = extract_xmp(&jpeg).unwrap();
        assert!(xmp.starts_with("<a>"));
        assert!(xmp.ends_with("</a>"));
    }

    #[test]
    fn test_write_xmp_segment() {
        let mut out = Vec::new();
        write_xmp_segment(&mut out, b"<x/>").unwrap();
        let len = XMP_SIGNATURE.len() + 4 + 2;
        assert_eq!(&out[..4], &[0xFF, APP1, 0x00, len as u8]);
        assert_eq!(out.len(), 2 + len);
        assert!(out.ends_with(b"<x/>"));
    }

    #[test]
    fn test_write_xmp_segment_too_large() {
        let huge = vec![b' '; MAX_MARKER_SIZE];
        let mut out = Vec::new();
        assert_matches!(
            write_xmp_segment(&mut out, &huge),
            Err(Error::DataTooLarge { .. })
        );
    }
}
