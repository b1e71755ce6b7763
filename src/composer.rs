//! Motion Photo composition
//!
//! A Motion Photo is laid out as:
//!
//! ```text
//! [JPEG segments before SOS][APP1 XMP][SOS .. EOI][video bytes]
//! ```
//!
//! Galleries find the video by counting `Item:Length` bytes back from the end
//! of the file, so the video must be the last thing written and nothing may
//! follow the JPEG's EOI except the video.

use crate::{
    error::{Error, Result},
    formats::{
        bmff_io::Mp4BoxWalker,
        jpeg_io::{extract_xmp, find_eoi, insert_segment_before_sos, EoiLocation},
    },
    xmp::{build_motion_photo_app1, MotionMetadata, XmpFields},
    MediaType,
};
use std::borrow::Cow;

/// Image transcoding collaborator
///
/// Converts a still image that is not JPEG (PNG, WebP, HEIC, ...) into JPEG
/// bytes. The crate ships no implementation; any `Fn(&[u8], MediaType) ->
/// Result<Vec<u8>>` closure can serve as one.
pub trait Transcoder: Send + Sync {
    /// Re-encode `image`, declared as `media_type`, to JPEG
    fn to_jpeg(&self, image: &[u8], media_type: MediaType) -> Result<Vec<u8>>;
}

impl<F> Transcoder for F
where
    F: Fn(&[u8], MediaType) -> Result<Vec<u8>> + Send + Sync,
{
    fn to_jpeg(&self, image: &[u8], media_type: MediaType) -> Result<Vec<u8>> {
        self(image, media_type)
    }
}

/// Measure the facts about a video that go into the Motion Photo XMP.
///
/// `data_length` falls back to the full length when no non-empty `mdat` is
/// found, and the presentation timestamp is half the movie duration (0 when
/// the duration is unknown).
pub fn measure_video(video: &[u8]) -> MotionMetadata {
    let walker = Mp4BoxWalker::new(video);
    let container_length = video.len() as u64;

    let data_length = match walker.mdat_payload_length() {
        Some(len) if len > 0 => len,
        _ => {
            tracing::warn!("no mdat payload found, using full video length");
            container_length
        }
    };
    let presentation_timestamp_us = match walker.movie_duration_micros() {
        Some(duration) => duration / 2,
        None => {
            tracing::warn!("movie duration unknown, presentation timestamp set to 0");
            0
        }
    };

    MotionMetadata {
        container_length,
        data_length,
        presentation_timestamp_us,
    }
}

/// A composed Motion Photo
#[derive(Debug, Clone)]
pub struct MotionPhoto {
    data: Vec<u8>,
    jpeg_length: usize,
    /// Metadata written into the XMP
    pub metadata: MotionMetadata,
    /// Where the source JPEG's EOI was found
    pub eoi: EoiLocation,
    /// Bytes dropped after the source JPEG's EOI
    pub trimmed_bytes: usize,
}

impl MotionPhoto {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The JPEG part, XMP included
    pub fn jpeg(&self) -> &[u8] {
        &self.data[..self.jpeg_length]
    }

    /// The embedded video
    pub fn video(&self) -> &[u8] {
        &self.data[self.jpeg_length..]
    }
}

/// Builds Motion Photos from a still image and a video
///
/// # Example
///
/// ```no_run
/// use motion_photo::{MediaType, MotionPhotoComposer};
///
/// # fn main() -> motion_photo::Result<()> {
/// # fn encode_jpeg(_: &[u8]) -> motion_photo::Result<Vec<u8>> { unimplemented!() }
/// let image = std::fs::read("still.webp")?;
/// let video = std::fs::read("clip.mp4")?;
///
/// let composer = MotionPhotoComposer::new()
///     .with_transcoder(|bytes: &[u8], _: MediaType| encode_jpeg(bytes));
/// let bytes = composer.compose(&image, "image/webp", &video)?;
/// std::fs::write("MVIMG_0001.jpg", bytes)?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MotionPhotoComposer {
    transcoder: Option<Box<dyn Transcoder>>,
    presentation_timestamp_us: Option<u64>,
    strict_eoi: bool,
}

impl std::fmt::Debug for MotionPhotoComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionPhotoComposer")
            .field("transcoder", &self.transcoder.is_some())
            .field("presentation_timestamp_us", &self.presentation_timestamp_us)
            .field("strict_eoi", &self.strict_eoi)
            .finish()
    }
}

impl MotionPhotoComposer {
    /// Composer with no transcoder, derived timestamps and lenient EOI search
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collaborator used when the image is not declared as JPEG
    pub fn with_transcoder(mut self, transcoder: impl Transcoder + 'static) -> Self {
        self.transcoder = Some(Box::new(transcoder));
        self
    }

    /// Use a fixed presentation timestamp instead of half the video duration
    pub fn with_presentation_timestamp(mut self, timestamp_us: u64) -> Self {
        self.presentation_timestamp_us = Some(timestamp_us);
        self
    }

    /// Reject images whose EOI can only be found by reverse search
    pub fn strict_eoi(mut self, strict: bool) -> Self {
        self.strict_eoi = strict;
        self
    }

    /// Compose and return the Motion Photo bytes
    pub fn compose(&self, image: &[u8], image_type: &str, video: &[u8]) -> Result<Vec<u8>> {
        Ok(self.assemble(image, image_type, video)?.into_bytes())
    }

    /// Compose and return the Motion Photo along with what was measured
    ///
    /// # Errors
    /// - `UnsupportedInput`: the image needs transcoding but no transcoder is
    ///   set, or the video is empty
    /// - `InvalidFormat` / `InvalidSegment`: the image is not a usable JPEG
    pub fn assemble(&self, image: &[u8], image_type: &str, video: &[u8]) -> Result<MotionPhoto> {
        if video.is_empty() {
            return Err(Error::UnsupportedInput("video is empty".into()));
        }

        let jpeg = self.normalize(image, MediaType::from_mime(image_type))?;

        let eoi = find_eoi(&jpeg)?;
        if self.strict_eoi && !eoi.is_structural() {
            return Err(Error::InvalidSegment {
                offset: eoi.offset,
                reason: "End-Of-Image only found by reverse search".into(),
            });
        }
        let trimmed = jpeg
            .get(..eoi.end_offset())
            .ok_or_else(|| Error::InvalidFormat("End-Of-Image past end of image".into()))?;
        let trimmed_bytes = jpeg.len() - trimmed.len();
        if trimmed_bytes > 0 {
            tracing::debug!(trimmed_bytes, "dropping bytes after EOI");
        }
        if extract_xmp(trimmed).is_some() {
            tracing::warn!("image already carries XMP; readers may prefer the existing packet");
        }

        let mut metadata = measure_video(video);
        if let Some(timestamp_us) = self.presentation_timestamp_us {
            metadata.presentation_timestamp_us = timestamp_us;
        }

        let app1 = build_motion_photo_app1(&metadata)?;
        let mut data = insert_segment_before_sos(trimmed, &app1)?;
        let jpeg_length = data.len();
        data.reserve_exact(video.len());
        data.extend_from_slice(video);

        tracing::debug!(
            jpeg_length,
            video_length = video.len(),
            timestamp_us = metadata.presentation_timestamp_us,
            "composed motion photo"
        );

        Ok(MotionPhoto {
            data,
            jpeg_length,
            metadata,
            eoi,
            trimmed_bytes,
        })
    }

    fn normalize<'a>(&self, image: &'a [u8], media_type: MediaType) -> Result<Cow<'a, [u8]>> {
        if media_type.is_jpeg() {
            return Ok(Cow::Borrowed(image));
        }
        let transcoder = self.transcoder.as_ref().ok_or_else(|| {
            Error::UnsupportedInput(format!("{media_type} image needs transcoding to JPEG"))
        })?;
        tracing::debug!(%media_type, "transcoding image to JPEG");
        Ok(Cow::Owned(transcoder.to_jpeg(image, media_type)?))
    }
}

/// Read the Motion Photo fields from a JPEG's XMP
///
/// A JPEG without XMP (or not a JPEG at all) yields all defaults.
pub fn probe(jpeg: &[u8]) -> XmpFields {
    XmpFields::parse(&extract_xmp(jpeg).unwrap_or_default())
}

/// Slice the embedded video out of a Motion Photo
///
/// The video is the last `Item:Length` bytes of the file. Returns `None` when
/// no length is declared or it exceeds the file.
pub fn extract_video(motion_photo: &[u8]) -> Option<&[u8]> {
    let length = usize::try_from(probe(motion_photo).motion_length).ok()?;
    if length == 0 {
        return None;
    }
    let start = motion_photo.len().checked_sub(length)?;
    Some(&motion_photo[start..])
}
