#![deny(unused_must_use, missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

#[macro_use]
extern crate serde_json;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

/// Writing a located fix into an image's EXIF GPS tags.
pub mod annotate;

/// Some helpers associated with driving the clis that ship with the extractor.
pub mod cli;

/// Details pertaining to parsing the optional configuration file.
pub mod config;

/// The error kinds a run can end in, and the exit status each one maps to.
pub mod error;

/// The request/response pipeline: validate the inputs, pull the telemetry, find the fix, and
/// stamp it onto an image if one was asked for.
pub mod extractor;

/// A module concerning itself with presenting offsets and coordinates in a human readable format.
pub mod formatting;

/// Pulling a still out of a video with ffmpeg, for when there's no image to stamp.
pub mod frame;

/// Decoding of GoPro's GPMF key-length-value telemetry payloads.
pub mod gpmf;

/// Our interface to the telemetry track inside the container. Contains the `TelemetrySource`
/// trait, and the ffmpeg backed implementation of it.
pub mod metadata_extractor;

/// Parsing the user's idea of a point in the video.
pub mod timestamp;

/// The GPS track laid out along the video's timeline, and the lookups into it.
pub mod track;

mod version;

/// What version of the extractor do you have :)
pub use crate::version::VERSION;

/// Who wrote this mess
pub use crate::version::AUTHOR;

#[cfg(test)]
/// Helpers for use in tests
mod test_helpers;
