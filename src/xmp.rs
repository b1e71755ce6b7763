//! Motion Photo XMP
//!
//! Builds the APP1 packet that turns a JPEG into a Motion Photo, and reads the
//! handful of fields that identify an existing one.
//!
//! The packet follows the Google Motion Photo container format with OPPO/ColorOS
//! `OpCamera` fields alongside, since some OEM galleries only look at those:
//!
//! ```text
//! <x:xmpmeta>
//!   <rdf:RDF>
//!     <rdf:Description GCamera:MotionPhoto="1" ...>
//!       <Container:Directory>
//!         <rdf:Seq>
//!           <rdf:li> <Container:Item Item:Semantic="Primary" .../> </rdf:li>
//!           <rdf:li> <Container:Item Item:Semantic="MotionPhoto" Item:Length=N/> </rdf:li>
//! ```

use crate::{error::Result, formats::jpeg_io::write_xmp_segment};
use quick_xml::{
    events::{BytesEnd, BytesStart, Event},
    Writer,
};
use regex::Regex;
use std::sync::LazyLock;

const NS_X: &str = "adobe:ns:meta/";
const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
const NS_GCAMERA: &str = "http://ns.google.com/photos/1.0/camera/";
const NS_OPCAMERA: &str = "http://ns.oplus.com/photos/1.0/camera/";
const NS_CONTAINER: &str = "http://ns.google.com/photos/1.0/container/";
const NS_ITEM: &str = "http://ns.google.com/photos/1.0/container/item/";
const XMP_TOOLKIT: &str = "Adobe XMP Core 5.1.0-jc003";

/// Facts about the companion video needed to describe it in XMP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionMetadata {
    /// Full byte length of the video file
    pub container_length: u64,
    /// Payload length of the video's `mdat` box
    pub data_length: u64,
    /// Frame shown as the still, in microseconds from the start of the video
    pub presentation_timestamp_us: u64,
}

impl MotionMetadata {
    /// Metadata for a video of `container_length` bytes with nothing else known
    pub fn new(container_length: u64) -> Self {
        Self {
            container_length,
            data_length: container_length,
            presentation_timestamp_us: 0,
        }
    }

    pub fn with_data_length(mut self, data_length: u64) -> Self {
        self.data_length = data_length;
        self
    }

    pub fn with_presentation_timestamp(mut self, timestamp_us: u64) -> Self {
        self.presentation_timestamp_us = timestamp_us;
        self
    }

    /// Length reported in `OpCamera:VideoLength`
    fn vendor_video_length(&self) -> u64 {
        if self.data_length > 0 {
            self.data_length
        } else {
            self.container_length
        }
    }
}

/// Serialize the Motion Photo XMP document
pub fn build_motion_photo_xmp(meta: &MotionMetadata) -> Result<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::with_capacity(2048), b' ', 2);

    let mut xmpmeta = BytesStart::new("x:xmpmeta");
    xmpmeta.push_attribute(("xmlns:x", NS_X));
    xmpmeta.push_attribute(("x:xmptk", XMP_TOOLKIT));
    writer.write_event(Event::Start(xmpmeta))?;

    let mut rdf = BytesStart::new("rdf:RDF");
    rdf.push_attribute(("xmlns:rdf", NS_RDF));
    writer.write_event(Event::Start(rdf))?;

    let timestamp = meta.presentation_timestamp_us.to_string();
    let video_length = meta.vendor_video_length().to_string();
    let mut desc = BytesStart::new("rdf:Description");
    desc.push_attribute(("rdf:about", ""));
    desc.push_attribute(("xmlns:GCamera", NS_GCAMERA));
    desc.push_attribute(("xmlns:OpCamera", NS_OPCAMERA));
    desc.push_attribute(("xmlns:Container", NS_CONTAINER));
    desc.push_attribute(("xmlns:Item", NS_ITEM));
    desc.push_attribute(("GCamera:MotionPhoto", "1"));
    desc.push_attribute(("GCamera:MotionPhotoVersion", "1"));
    desc.push_attribute((
        "GCamera:MotionPhotoPresentationTimestampUs",
        timestamp.as_str(),
    ));
    desc.push_attribute((
        "OpCamera:MotionPhotoPrimaryPresentationTimestampUs",
        timestamp.as_str(),
    ));
    desc.push_attribute(("OpCamera:MotionPhotoOwner", "oplus"));
    desc.push_attribute(("OpCamera:OLivePhotoVersion", "2"));
    desc.push_attribute(("OpCamera:VideoLength", video_length.as_str()));
    writer.write_event(Event::Start(desc))?;

    writer.write_event(Event::Start(BytesStart::new("Container:Directory")))?;
    writer.write_event(Event::Start(BytesStart::new("rdf:Seq")))?;

    // Primary length 0: the image runs from the start of the file to the video
    write_container_item(
        &mut writer,
        &[
            ("Item:Mime", "image/jpeg"),
            ("Item:Semantic", "Primary"),
            ("Item:Length", "0"),
            ("Item:Padding", "0"),
        ],
    )?;
    let container_length = meta.container_length.to_string();
    write_container_item(
        &mut writer,
        &[
            ("Item:Mime", "video/mp4"),
            ("Item:Semantic", "MotionPhoto"),
            ("Item:Length", container_length.as_str()),
        ],
    )?;

    writer.write_event(Event::End(BytesEnd::new("rdf:Seq")))?;
    writer.write_event(Event::End(BytesEnd::new("Container:Directory")))?;
    writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
    writer.write_event(Event::End(BytesEnd::new("rdf:RDF")))?;
    writer.write_event(Event::End(BytesEnd::new("x:xmpmeta")))?;

    let mut xml = writer.into_inner();
    xml.push(b'\n');
    Ok(xml)
}

fn write_container_item(writer: &mut Writer<Vec<u8>>, attributes: &[(&str, &str)]) -> Result<()> {
    let mut li = BytesStart::new("rdf:li");
    li.push_attribute(("rdf:parseType", "Resource"));
    writer.write_event(Event::Start(li))?;

    let mut item = BytesStart::new("Container:Item");
    for &attribute in attributes {
        item.push_attribute(attribute);
    }
    writer.write_event(Event::Empty(item))?;

    writer.write_event(Event::End(BytesEnd::new("rdf:li")))?;
    Ok(())
}

/// Build a ready-to-inject APP1 segment (marker, length, namespace header, XML)
pub fn build_motion_photo_app1(meta: &MotionMetadata) -> Result<Vec<u8>> {
    let xml = build_motion_photo_xmp(meta)?;
    let mut segment = Vec::with_capacity(xml.len() + 64);
    write_xmp_segment(&mut segment, &xml)?;
    Ok(segment)
}

static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"hdrgm:Version="([^"]+)""#).expect("valid regex"));
static MOTION_PHOTO_FLAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"GCamera:(?:MotionPhoto|MicroVideo)="1""#).expect("valid regex")
});
static PRESENTATION_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"GCamera:MotionPhotoPresentationTimestampUs="(\d+)""#).expect("valid regex")
});
static VENDOR_VIDEO_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"OpCamera:VideoLength="(\d+)""#).expect("valid regex"));
static GAIN_MAP_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)Item:Semantic="GainMap".*?Item:Length="(\d+)""#).expect("valid regex")
});
static MOTION_LENGTH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)Item:Semantic="MotionPhoto".*?Item:Length="(\d+)""#).expect("valid regex")
});

/// Fields read from existing XMP to detect a Motion Photo
///
/// Every field is looked up on its own; a missing one stays at its default and
/// never hides the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpFields {
    /// `hdrgm:Version` of an Ultra HDR gain map, if any
    pub version_tag: String,
    /// `GCamera:MotionPhoto` (or legacy `GCamera:MicroVideo`) set to 1
    pub motion_photo: bool,
    /// `GCamera:MotionPhotoPresentationTimestampUs`
    pub presentation_timestamp_us: u64,
    /// `OpCamera:VideoLength`
    pub video_length_declared: u64,
    /// `Item:Length` of the `GainMap` container item
    pub gain_map_length: u64,
    /// `Item:Length` of the `MotionPhoto` container item
    pub motion_length: u64,
}

impl XmpFields {
    /// Extract the known fields from XMP text (which may be empty)
    ///
    /// # Example
    ///
    /// ```
    /// use motion_photo::XmpFields;
    ///
    /// let fields = XmpFields::parse(r#"<Container:Item Item:Semantic="MotionPhoto" Item:Length="4096"/>"#);
    /// assert_eq!(fields.motion_length, 4096);
    /// assert_eq!(fields.presentation_timestamp_us, 0);
    /// ```
    pub fn parse(xmp: &str) -> Self {
        Self {
            version_tag: capture(&VERSION_TAG, xmp).unwrap_or_default().to_string(),
            motion_photo: MOTION_PHOTO_FLAG.is_match(xmp),
            presentation_timestamp_us: capture_u64(&PRESENTATION_TIMESTAMP, xmp),
            video_length_declared: capture_u64(&VENDOR_VIDEO_LENGTH, xmp),
            gain_map_length: capture_u64(&GAIN_MAP_LENGTH, xmp),
            motion_length: capture_u64(&MOTION_LENGTH, xmp),
        }
    }

    /// True when the XMP declares an embedded motion video
    pub fn is_motion_photo(&self) -> bool {
        self.motion_photo || self.motion_length > 0
    }
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn capture_u64(re: &Regex, text: &str) -> u64 {
    capture(re, text)
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::jpeg_io::XMP_SIGNATURE;
    use quick_xml::Reader;

    fn sample_meta() -> MotionMetadata {
        MotionMetadata::new(123_456)
            .with_data_length(120_000)
            .with_presentation_timestamp(1_500_000)
    }

    fn assert_well_formed(xml: &str) {
        let mut reader = Reader::from_str(xml);
        let mut depth = 0i32;
        loop {
            match reader.read_event() {
                Ok(Event::Start(_)) => depth += 1,
                Ok(Event::End(_)) => depth -= 1,
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("malformed XML: {e}"),
            }
        }
        assert_eq!(depth, 0, "unbalanced elements");
    }

    #[test]
    fn test_xmp_is_well_formed() {
        let xml = build_motion_photo_xmp(&sample_meta()).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.starts_with("<x:xmpmeta"));
        assert_well_formed(&xml);
    }

    #[test]
    fn test_xmp_declares_motion_photo() {
        let xml = String::from_utf8(build_motion_photo_xmp(&sample_meta()).unwrap()).unwrap();
        assert!(xml.contains(r#"GCamera:MotionPhoto="1""#));
        assert!(xml.contains(r#"GCamera:MotionPhotoVersion="1""#));
        assert!(xml.contains(r#"GCamera:MotionPhotoPresentationTimestampUs="1500000""#));
        assert!(xml.contains(r#"OpCamera:MotionPhotoPrimaryPresentationTimestampUs="1500000""#));
        assert!(xml.contains(r#"OpCamera:VideoLength="120000""#));
        assert!(xml.contains(r#"Item:Semantic="Primary" Item:Length="0""#));
        assert!(xml.contains(r#"Item:Mime="video/mp4" Item:Semantic="MotionPhoto" Item:Length="123456""#));
    }

    #[test]
    fn test_primary_item_precedes_motion_item() {
        let xml = String::from_utf8(build_motion_photo_xmp(&sample_meta()).unwrap()).unwrap();
        let primary = xml.find(r#"Item:Semantic="Primary""#).unwrap();
        let motion = xml.find(r#"Item:Semantic="MotionPhoto""#).unwrap();
        assert!(primary < motion);
    }

    #[test]
    fn test_vendor_length_falls_back_to_container() {
        let meta = MotionMetadata::new(777).with_data_length(0);
        let xml = String::from_utf8(build_motion_photo_xmp(&meta).unwrap()).unwrap();
        assert!(xml.contains(r#"OpCamera:VideoLength="777""#));
    }

    #[test]
    fn test_app1_segment_layout() {
        let segment = build_motion_photo_app1(&sample_meta()).unwrap();
        assert_eq!(&segment[..2], &[0xFF, 0xE1]);

        let length = u16::from_be_bytes([segment[2], segment[3]]) as usize;
        assert_eq!(length, segment.len() - 2);
        assert_eq!(&segment[4..4 + XMP_SIGNATURE.len()], XMP_SIGNATURE);

        let xml = std::str::from_utf8(&segment[4 + XMP_SIGNATURE.len()..]).unwrap();
        assert_well_formed(xml);
    }

    #[test]
    fn test_parse_built_xmp() {
        let xml = String::from_utf8(build_motion_photo_xmp(&sample_meta()).unwrap()).unwrap();
        let fields = XmpFields::parse(&xml);
        assert!(fields.is_motion_photo());
        assert_eq!(fields.presentation_timestamp_us, 1_500_000);
        assert_eq!(fields.video_length_declared, 120_000);
        assert_eq!(fields.motion_length, 123_456);
        assert_eq!(fields.gain_map_length, 0);
        assert_eq!(fields.version_tag, "");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(XmpFields::parse(""), XmpFields::default());
        assert!(!XmpFields::default().is_motion_photo());
    }

    #[test]
    fn test_parse_fields_independently() {
        let xmp = r#"<rdf:Description hdrgm:Version="1.0"
            GCamera:MotionPhotoPresentationTimestampUs="not-a-number">
            <Container:Item Item:Semantic="GainMap" Item:Mime="image/jpeg" Item:Length="5120"/>
            <Container:Item Item:Semantic="MotionPhoto" Item:Mime="video/mp4" Item:Length="90000"/>
        </rdf:Description>"#;
        let fields = XmpFields::parse(xmp);
        assert_eq!(fields.version_tag, "1.0");
        assert_eq!(fields.presentation_timestamp_us, 0);
        assert_eq!(fields.gain_map_length, 5120);
        assert_eq!(fields.motion_length, 90000);
        assert!(!fields.motion_photo);
        assert!(fields.is_motion_photo());
    }

    #[test]
    fn test_parse_legacy_micro_video() {
        let fields = XmpFields::parse(r#"GCamera:MicroVideo="1" GCamera:MicroVideoOffset="2048""#);
        assert!(fields.motion_photo);
        assert_eq!(fields.motion_length, 0);
    }

    #[test]
    fn test_parse_overflowing_number() {
        let fields = XmpFields::parse(r#"OpCamera:VideoLength="99999999999999999999999""#);
        assert_eq!(fields.video_length_declared, 0);
    }
}
