use std::path::Path;
use std::time::Duration;

use crate::formatting::format_offset;

/// Everything that can go wrong between reading the arguments and printing a fix. Anything not
/// covered here (config parse errors and the like) travels as a plain `failure::Error`.
#[derive(Fail, Debug, PartialEq)]
pub enum ExtractError {
    #[fail(display = "Couldn't parse timestamp {:?}, expected HH:MM:SS[.fff], MM:SS or seconds", _0)]
    InvalidTimestamp(String),
    #[fail(display = "Video file not found or unreadable: {}", _0)]
    VideoNotFound(String),
    #[fail(display = "Image file not found or unreadable: {}", _0)]
    ImageNotFound(String),
    #[fail(display = "Timestamp {} is outside the recorded range 00:00:00.000 - {}", requested, limit)]
    TimestampOutOfRange { requested: String, limit: String },
    #[fail(display = "No GPS telemetry found in {}", _0)]
    NoTelemetry(String),
    #[fail(display = "Telemetry in the container is corrupt: {}", _0)]
    CorruptContainer(String),
    #[fail(display = "Couldn't run {}: {}", tool, reason)]
    Tool { tool: String, reason: String },
    #[fail(display = "Image processing failed: {}", _0)]
    Image(String),
}

/// The three stages an error can surface from, which also decide the exit status.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Input,
    Extraction,
    Output,
}

impl ErrorKind {
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Input => 2,
            ErrorKind::Extraction => 3,
            ErrorKind::Output => 4,
        }
    }
}

impl ExtractError {
    pub fn video_not_found(path: &Path) -> ExtractError {
        ExtractError::VideoNotFound(path.display().to_string())
    }

    pub fn image_not_found(path: &Path) -> ExtractError {
        ExtractError::ImageNotFound(path.display().to_string())
    }

    pub fn no_telemetry(path: &Path) -> ExtractError {
        ExtractError::NoTelemetry(path.display().to_string())
    }

    pub fn out_of_range(requested: Duration, limit: Duration) -> ExtractError {
        ExtractError::TimestampOutOfRange {
            requested: format_offset(requested),
            limit: format_offset(limit),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        use ExtractError::*;
        match self {
            InvalidTimestamp(_) | VideoNotFound(_) | ImageNotFound(_) | TimestampOutOfRange { .. } => {
                ErrorKind::Input
            }
            NoTelemetry(_) | CorruptContainer(_) | Tool { .. } => ErrorKind::Extraction,
            Image(_) => ErrorKind::Output,
        }
    }
}

/// Pick the process exit status for an arbitrary error, falling back to 1 for anything that isn't
/// one of ours.
pub fn exit_code(error: &failure::Error) -> i32 {
    match error.downcast_ref::<ExtractError>() {
        Some(e) => e.kind().exit_code(),
        None => 1,
    }
}
