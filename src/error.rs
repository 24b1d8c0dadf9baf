// ============================================================================
// ERRORS: one enum for the whole editing engine
// ============================================================================

use std::fmt;

/// Errors surfaced by the editing and healing engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EditError {
    /// Zero-sized container, image or display rectangle.
    DegenerateGeometry,
    /// Overlay or base image could not be decoded (or took too long).
    DecodeFailed(String),
    /// Healing was requested with no strokes (or strokes entirely off-image).
    EmptyRegion,
    /// Hole mask and image disagree on dimensions.
    InvalidMask {
        image: (u32, u32),
        mask: (u32, u32),
    },
    /// Raw sample data does not hold `width * height` pixels of
    /// `channels` bytes each.
    InvalidBuffer {
        width: u32,
        height: u32,
        channels: u8,
        len: usize,
    },
    ProviderUnavailable(String),
    ProviderRejected {
        code: i64,
        message: String,
    },
    Timeout,
    /// The working image changed while a heal was in flight.
    Superseded,
    UnknownMark(uuid::Uuid),
    Encode(String),
    Io(String),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::DegenerateGeometry => write!(f, "Degenerate geometry: zero-sized container or image"),
            EditError::DecodeFailed(e) => write!(f, "Failed to decode image: {}", e),
            EditError::EmptyRegion => write!(f, "Nothing to heal: no strokes inside the image"),
            EditError::InvalidMask { image, mask } => write!(
                f,
                "Mask is {}x{} but image is {}x{}",
                mask.0, mask.1, image.0, image.1
            ),
            EditError::InvalidBuffer { width, height, channels, len } => write!(
                f,
                "Buffer of {} bytes cannot hold a {}x{} image at {} byte(s) per pixel",
                len, width, height, channels
            ),
            EditError::ProviderUnavailable(e) => write!(f, "Healing provider unavailable: {}", e),
            EditError::ProviderRejected { code, message } => {
                write!(f, "Healing provider rejected the request ({}): {}", code, message)
            }
            EditError::Timeout => write!(f, "Healing provider timed out"),
            EditError::Superseded => write!(f, "Working image changed during healing; result discarded"),
            EditError::UnknownMark(id) => write!(f, "No mark with id {}", id),
            EditError::Encode(e) => write!(f, "Failed to encode image: {}", e),
            EditError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for EditError {}

impl From<std::io::Error> for EditError {
    fn from(e: std::io::Error) -> Self {
        EditError::Io(e.to_string())
    }
}

impl From<image::ImageError> for EditError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => EditError::Io(io.to_string()),
            image::ImageError::Decoding(d) => EditError::DecodeFailed(d.to_string()),
            other => EditError::Encode(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EditError {
    fn from(e: serde_json::Error) -> Self {
        EditError::Io(format!("JSON: {}", e))
    }
}

pub type EditResult<T> = Result<T, EditError>;
