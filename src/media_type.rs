//! Media type definitions
//!
//! Classifies the declared content type of an input so the composer knows
//! whether the still image must be transcoded to JPEG first.

/// Specific media type - what the content represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    /// Standard JPEG image
    Jpeg,
    /// PNG image
    Png,
    /// WebP image
    Webp,
    /// GIF image
    Gif,
    /// HEIC / HEIF image
    Heic,
    /// AVIF image
    Avif,
    /// MP4 video
    Mp4,
    /// Anything else
    Unknown,
}

impl MediaType {
    /// Classify a declared content type (e.g. an HTTP `Content-Type` header value)
    ///
    /// Matching is lenient: parameters and casing are ignored, and any type
    /// mentioning `jpeg` or `jpg` is treated as JPEG.
    ///
    /// # Example
    ///
    /// ```
    /// use motion_photo::MediaType;
    ///
    /// assert_eq!(MediaType::from_mime("image/jpeg; charset=binary"), MediaType::Jpeg);
    /// assert_eq!(MediaType::from_mime("image/pjpeg"), MediaType::Jpeg);
    /// assert_eq!(MediaType::from_mime("image/webp"), MediaType::Webp);
    /// assert_eq!(MediaType::from_mime(""), MediaType::Unknown);
    /// ```
    pub fn from_mime(declared: &str) -> MediaType {
        let lower = declared.trim().to_ascii_lowercase();
        if lower.contains("jpeg") || lower.contains("jpg") {
            MediaType::Jpeg
        } else if lower.contains("png") {
            MediaType::Png
        } else if lower.contains("webp") {
            MediaType::Webp
        } else if lower.contains("gif") {
            MediaType::Gif
        } else if lower.contains("heic") || lower.contains("heif") {
            MediaType::Heic
        } else if lower.contains("avif") {
            MediaType::Avif
        } else if lower.contains("mp4") {
            MediaType::Mp4
        } else {
            MediaType::Unknown
        }
    }

    /// Detect the media type from leading magic bytes
    pub fn detect(header: &[u8]) -> MediaType {
        match header {
            [0xFF, 0xD8, ..] => MediaType::Jpeg,
            [0x89, b'P', b'N', b'G', ..] => MediaType::Png,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => MediaType::Webp,
            [b'G', b'I', b'F', b'8', ..] => MediaType::Gif,
            [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..] if brand.len() >= 4 => {
                match &brand[..4] {
                    b"heic" | b"heix" | b"mif1" | b"msf1" => MediaType::Heic,
                    b"avif" | b"avis" => MediaType::Avif,
                    _ => MediaType::Mp4,
                }
            }
            _ => MediaType::Unknown,
        }
    }

    /// Check whether this is a JPEG type
    pub fn is_jpeg(&self) -> bool {
        matches!(self, MediaType::Jpeg)
    }

    /// Get the primary MIME type for this media type
    pub fn to_mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Webp => "image/webp",
            MediaType::Gif => "image/gif",
            MediaType::Heic => "image/heic",
            MediaType::Avif => "image/avif",
            MediaType::Mp4 => "video/mp4",
            MediaType::Unknown => "application/octet-stream",
        }
    }

    /// Get the primary file extension for this media type (without dot)
    pub fn to_extension(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
            MediaType::Png => "png",
            MediaType::Webp => "webp",
            MediaType::Gif => "gif",
            MediaType::Heic => "heic",
            MediaType::Avif => "avif",
            MediaType::Mp4 => "mp4",
            MediaType::Unknown => "bin",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_mime())
    }
}
