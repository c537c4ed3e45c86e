//! Element-level error taxonomy shared by schedulers, workers and the cache.
//!
//! Codes are stable integers so the transport layer can forward them
//! unchanged to clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport-visible error classes for a single URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(i32)]
pub enum ErrorCode {
    /// No worker handles the URI scheme / MIME type combination.
    Unsupported = 1,
    /// The requested output flavor is not known.
    UnsupportedFlavor = 2,
    /// An asynchronous worker did not answer within its bound.
    ConnectionFailed = 3,
    /// The worker could not decode the source.
    InvalidFormat = 4,
    /// The source has nothing to render (empty file, no video stream).
    NoContent = 5,
    /// The source already lives in the thumbnail cache.
    IsThumbnail = 6,
    /// The generated thumbnail could not be written to the cache.
    SaveFailed = 7,
    /// The worker observed its cancellation token.
    Cancelled = 8,
    Internal = 9,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unsupported => "unsupported",
            Self::UnsupportedFlavor => "unsupported-flavor",
            Self::ConnectionFailed => "connection-failed",
            Self::InvalidFormat => "invalid-format",
            Self::NoContent => "no-content",
            Self::IsThumbnail => "is-thumbnail",
            Self::SaveFailed => "save-failed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// A failure for one element of a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ThumbnailError {
    pub code: ErrorCode,
    pub message: String,
}

impl ThumbnailError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn unsupported(uri: &str) -> Self {
        Self::new(ErrorCode::Unsupported, format!("No thumbnailer available for \"{uri}\""))
    }

    pub fn is_thumbnail(uri: &str) -> Self {
        Self::new(ErrorCode::IsThumbnail, format!("The file \"{uri}\" is a thumbnail itself"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorCode::Unsupported.as_i32(), 1);
        assert_eq!(ErrorCode::UnsupportedFlavor.as_i32(), 2);
        assert_eq!(ErrorCode::SaveFailed.as_i32(), 7);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ThumbnailError::unsupported("file:///tmp/x.xyz");
        assert_eq!(
            err.to_string(),
            "unsupported: No thumbnailer available for \"file:///tmp/x.xyz\""
        );
    }

    #[test]
    fn code_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCode::UnsupportedFlavor).unwrap();
        assert_eq!(json, "\"unsupported-flavor\"");
    }
}
