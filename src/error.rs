//! Error types for zenpik

use std::fmt;

/// Result type for zenpik operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for zenpik operations
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid image dimensions (zero area or above the format limit)
    InvalidDimensions {
        width: usize,
        height: usize,
        reason: &'static str,
    },
    /// Pixel buffer length does not match the declared dimensions
    InvalidPixelData {
        expected: usize,
        actual: usize,
    },
    /// Total pixel count exceeds the decoder's configured limit
    ImageTooLarge {
        num_pixels: u64,
        max_num_pixels: u64,
    },
    /// The compressed stream is truncated or inconsistent
    MalformedBitstream {
        reason: &'static str,
    },
    /// A recognized but unimplemented pathway was requested
    Unsupported(&'static str),
    /// Encoding failed
    EncodingFailed {
        stage: &'static str,
        reason: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidDimensions { width, height, reason } => {
                write!(f, "Invalid dimensions {}x{}: {}", width, height, reason)
            }
            Error::InvalidPixelData { expected, actual } => {
                write!(f, "Expected {} bytes of pixel data, got {}", expected, actual)
            }
            Error::ImageTooLarge { num_pixels, max_num_pixels } => {
                write!(f, "Image has {} pixels, limit is {}", num_pixels, max_num_pixels)
            }
            Error::MalformedBitstream { reason } => {
                write!(f, "Malformed bitstream: {}", reason)
            }
            Error::Unsupported(what) => write!(f, "Unsupported: {}", what),
            Error::EncodingFailed { stage, reason } => {
                write!(f, "Encoding failed at {}: {}", stage, reason)
            }
        }
    }
}

impl std::error::Error for Error {}
