//! BMFF (ISO Base Media File Format) box walking
//!
//! Only what a Motion Photo needs from its video: the size of the top-level
//! `mdat` payload and the movie duration from `moov/mvhd`. Both are best-effort
//! facts; a missing or damaged box yields `None`, never an error.
//!
//! Reference: ISO/IEC 14496-12:2022

use crate::{
    formats::{read_u32_be, read_u64_be},
    segment::ByteRange,
};

// BMFF constants
const HEADER_SIZE: usize = 8; // 4 byte size + 4 byte type
const HEADER_SIZE_LARGE: usize = 16; // 4 byte size + 4 byte type + 8 byte large size

/// Box type enum for the BMFF boxes this crate cares about
macro_rules! boxtype {
    ($( $name:ident => $value:expr ),*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum BoxType {
            $( $name, )*
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> BoxType {
                match t {
                    $( $value => BoxType::$name, )*
                    _ => BoxType::UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(t: BoxType) -> u32 {
                match t {
                    $( BoxType::$name => $value, )*
                    BoxType::UnknownBox(t) => t,
                }
            }
        }
    }
}

boxtype! {
    FtypBox => 0x66747970,
    FreeBox => 0x66726565,
    SkipBox => 0x736b6970,
    WideBox => 0x77696465,
    MdatBox => 0x6d646174,
    MoovBox => 0x6d6f6f76,
    MvhdBox => 0x6d766864,
    TrakBox => 0x7472616b,
    UdtaBox => 0x75647461,
    MetaBox => 0x6D657461,
    UuidBox => 0x75756964
}

/// A box header located in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp4Box {
    /// Decoded box type
    pub box_type: BoxType,
    /// Raw four-character code
    pub fourcc: [u8; 4],
    /// Offset of the size field
    pub offset: usize,
    /// 8, or 16 when a 64-bit size follows the type
    pub header_len: usize,
    /// Declared size in bytes, header included (size 0 resolved to end of buffer)
    pub size: u64,
    /// Payload range, clamped to the bytes actually present
    pub payload: ByteRange,
}

impl Mp4Box {
    /// Four-character code as text
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }

    /// End offset according to the declared size (may exceed the buffer)
    pub fn declared_end(&self) -> u64 {
        (self.offset as u64).saturating_add(self.size)
    }

    /// True when the declared size runs past the available bytes
    pub fn is_truncated(&self) -> bool {
        self.payload.size as u64 != self.size - self.header_len as u64
    }
}

/// Read the box header at `cursor`.
///
/// Size `1` means a 64-bit size follows the type, size `0` means the box runs
/// to the end of the buffer. Returns the box and the cursor of the next sibling
/// (capped at the buffer length), or `None` when no header fits or the declared
/// size is smaller than the header itself.
pub fn next_box(buf: &[u8], cursor: usize) -> Option<(Mp4Box, usize)> {
    let size32 = read_u32_be(buf, cursor)?;
    let fourcc: [u8; 4] = buf.get(cursor + 4..cursor + 8)?.try_into().ok()?;

    let (size, header_len) = match size32 {
        1 => (read_u64_be(buf, cursor + 8)?, HEADER_SIZE_LARGE),
        0 => ((buf.len() - cursor) as u64, HEADER_SIZE),
        n => (n as u64, HEADER_SIZE),
    };
    if size < header_len as u64 {
        return None;
    }

    let payload_start = cursor + header_len;
    let available = (buf.len() - payload_start) as u64;
    let payload_size = (size - header_len as u64).min(available) as usize;

    let mp4_box = Mp4Box {
        box_type: BoxType::from(u32::from_be_bytes(fourcc)),
        fourcc,
        offset: cursor,
        header_len,
        size,
        payload: ByteRange::new(payload_start, payload_size),
    };
    let next = usize::try_from(mp4_box.declared_end())
        .unwrap_or(usize::MAX)
        .min(buf.len());
    Some((mp4_box, next))
}

/// Iterator over sibling boxes
///
/// At top level the walk ends when no further header fits. Inside a parent it
/// also ends at the first child whose declared end passes the parent's.
#[derive(Debug, Clone)]
pub struct Mp4Boxes<'a> {
    buf: &'a [u8],
    cursor: usize,
    end: u64,
    finished: bool,
}

impl<'a> Mp4Boxes<'a> {
    /// Walk the top-level boxes of `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            end: u64::MAX,
            finished: false,
        }
    }

    /// Walk the direct children of `parent` (no recursion)
    pub fn children(buf: &'a [u8], parent: &Mp4Box) -> Self {
        Self {
            buf,
            cursor: parent.payload.offset,
            end: parent.declared_end(),
            finished: false,
        }
    }
}

impl<'a> Iterator for Mp4Boxes<'a> {
    type Item = Mp4Box;

    fn next(&mut self) -> Option<Mp4Box> {
        if self.finished || self.cursor as u64 + HEADER_SIZE as u64 > self.end {
            return None;
        }
        match next_box(self.buf, self.cursor) {
            Some((mp4_box, next)) if mp4_box.declared_end() <= self.end => {
                self.cursor = next;
                Some(mp4_box)
            }
            _ => {
                self.finished = true;
                None
            }
        }
    }
}

/// Timing fields of a movie header (`mvhd`) box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeader {
    /// Full-box version (0 or 1)
    pub version: u8,
    /// Time units per second
    pub timescale: u32,
    /// Duration in timescale units
    pub duration: u64,
}

impl MovieHeader {
    /// Parse the payload of an `mvhd` box
    ///
    /// Version 0 carries 32-bit creation/modification times and duration,
    /// version 1 carries 64-bit ones. The timescale is 32-bit in both.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let version = *payload.first()?;
        let (timescale, duration) = match version {
            0 => (read_u32_be(payload, 12)?, read_u32_be(payload, 16)? as u64),
            1 => (read_u32_be(payload, 20)?, read_u64_be(payload, 24)?),
            _ => return None,
        };
        Some(Self {
            version,
            timescale,
            duration,
        })
    }

    /// Duration in microseconds, rounded down; `None` when the timescale is zero
    pub fn duration_micros(&self) -> Option<u64> {
        if self.timescale == 0 {
            return None;
        }
        let micros = self.duration as u128 * 1_000_000 / self.timescale as u128;
        Some(u64::try_from(micros).unwrap_or(u64::MAX))
    }
}

/// Read-only queries over the top-level boxes of a video
#[derive(Debug, Clone, Copy)]
pub struct Mp4BoxWalker<'a> {
    buf: &'a [u8],
}

impl<'a> Mp4BoxWalker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Iterate the top-level boxes
    pub fn boxes(&self) -> Mp4Boxes<'a> {
        Mp4Boxes::new(self.buf)
    }

    /// First top-level box of the given type
    pub fn find(&self, box_type: BoxType) -> Option<Mp4Box> {
        self.boxes().find(|b| b.box_type == box_type)
    }

    /// Payload length of the first top-level `mdat`, clamped to the bytes present
    pub fn mdat_payload_length(&self) -> Option<u64> {
        let mdat = self.find(BoxType::MdatBox)?;
        if mdat.is_truncated() {
            tracing::debug!(
                declared = mdat.size,
                available = mdat.payload.size,
                "mdat runs past end of buffer"
            );
        }
        Some(mdat.payload.size as u64)
    }

    /// The `moov/mvhd` header, looked up without recursing past `moov`'s children
    pub fn movie_header(&self) -> Option<MovieHeader> {
        let moov = self.find(BoxType::MoovBox)?;
        let mvhd = Mp4Boxes::children(self.buf, &moov).find(|b| b.box_type == BoxType::MvhdBox)?;
        MovieHeader::parse(mvhd.payload.slice(self.buf)?)
    }

    /// Movie duration in microseconds
    pub fn movie_duration_micros(&self) -> Option<u64> {
        self.movie_header()?.duration_micros()
    }
}
