//! Motion Photo composition: a still JPEG and a short MP4 fused into one file.
//!
//! The output is a valid JPEG that carries Google Camera (`GCamera`) and OPPO
//! (`OpCamera`) Motion Photo XMP in an APP1 segment before Start-Of-Scan, with
//! the video appended after the End-Of-Image marker. Galleries that understand
//! the XMP locate the video by its declared length from the end of the file;
//! everything else just shows the photo.
//!
//! # Design Principles
//!
//! - **Structure over heuristics**: the EOI is found by walking segments and
//!   the entropy-coded scan, never by searching for `FF D9` first
//! - **Byte preservation**: nothing of the input image is removed except
//!   trailing bytes after its EOI
//! - **Bounded parsing**: every length read from the input is checked against
//!   the buffer before it is used
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> motion_photo::Result<()> {
//! let image = std::fs::read("photo.jpg")?;
//! let video = std::fs::read("clip.mp4")?;
//!
//! let bytes = motion_photo::compose(&image, "image/jpeg", &video)?;
//! std::fs::write("motion.jpg", bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Composer API
//!
//! For non-JPEG input, timestamp overrides or strict EOI handling, configure a
//! [`MotionPhotoComposer`]:
//!
//! ```no_run
//! use motion_photo::{MediaType, MotionPhotoComposer};
//!
//! # fn main() -> motion_photo::Result<()> {
//! # let (image, video) = (Vec::new(), Vec::new());
//! let composer = MotionPhotoComposer::new()
//!     .with_transcoder(|png: &[u8], _: MediaType| -> motion_photo::Result<Vec<u8>> {
//!         // hand off to an image codec here
//!         Ok(png.to_vec())
//!     })
//!     .strict_eoi(true);
//!
//! let photo = composer.assemble(&image, "image/png", &video)?;
//! println!("{} bytes, video at {}", photo.len(), photo.jpeg().len());
//! # Ok(())
//! # }
//! ```

mod composer;
mod error;
pub mod formats;
mod media_type;
mod segment;
pub mod xmp;

pub use composer::{
    extract_video, measure_video, probe, MotionPhoto, MotionPhotoComposer, Transcoder,
};
pub use error::{Error, Result};
pub use formats::bmff_io::{BoxType, MovieHeader, Mp4Box, Mp4BoxWalker, Mp4Boxes};
pub use formats::jpeg_io::{
    extract_xmp, find_eoi, insert_segment_before_sos, EoiLocation, EoiMethod, JpegSegments,
    XMP_SIGNATURE,
};
pub use media_type::MediaType;
pub use segment::{ByteRange, JpegMarker, Segment};
pub use xmp::{build_motion_photo_app1, build_motion_photo_xmp, MotionMetadata, XmpFields};

// Test utilities - only compiled for tests or when explicitly enabled
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Compose a Motion Photo with default settings.
///
/// `image_type` is the declared MIME type of `image`; anything other than JPEG
/// needs a transcoder, so use [`MotionPhotoComposer::with_transcoder`] for
/// those.
///
/// # Errors
/// - `UnsupportedInput`: empty video, or a non-JPEG image
/// - `InvalidFormat`: the image has no SOI or no EOI
/// - `DataTooLarge`: the XMP does not fit in one APP1 segment
pub fn compose(image: &[u8], image_type: &str, video: &[u8]) -> Result<Vec<u8>> {
    MotionPhotoComposer::new().compose(image, image_type, video)
}
