//! Error types for motion-photo

use std::io;

/// Result type for motion-photo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while composing or inspecting a Motion Photo
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unrecognized binary structure
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Malformed structure at a known location
    #[error("Invalid segment at offset {offset}: {reason}")]
    InvalidSegment { offset: usize, reason: String },

    /// Input that cannot be handled with the configured collaborators
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Data size exceeds maximum allowed
    #[error("Data too large: {size} bytes (max: {max})")]
    DataTooLarge { size: usize, max: usize },

    /// XML serialization error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// True for errors caused by malformed binary structure
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::InvalidFormat(_) | Error::InvalidSegment { .. })
    }
}
