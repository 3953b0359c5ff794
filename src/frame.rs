use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::ExtractError;

/// Where a still pulled from `video` at `at` is written: next to the video, named after it and
/// the whole second it was taken at.
pub fn frame_path(video: &Path, at: Duration) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    video.with_file_name(format!("{}.{}.jpg", stem, at.as_secs()))
}

/// Grab a single JPEG frame out of the video at the given offset.
pub fn extract_frame(ffmpeg: &str, video: &Path, at: Duration) -> Result<PathBuf, ExtractError> {
    let destination = frame_path(video, at);
    info!("Extracting a still from {:?} at {:.3}s", video, at.as_secs_f64());

    let mut command = Command::new(ffmpeg);
    command
        .arg("-y")
        .arg("-v").arg("error")
        .arg("-ss").arg(format!("{:.3}", at.as_secs_f64()))
        .arg("-i").arg(video)
        .arg("-vframes").arg("1")
        .arg("-qscale:v").arg("3")
        .arg(&destination);
    debug!("Running {:?}", command);

    let output = command.output().map_err(|e| ExtractError::Tool {
        tool: ffmpeg.to_string(),
        reason: e.to_string(),
    })?;
    if !output.status.success() || !destination.is_file() {
        return Err(ExtractError::Image(format!(
            "ffmpeg couldn't extract a frame at {:.3}s: {}",
            at.as_secs_f64(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    info!("Still written to {:?}", &destination);
    Ok(destination)
}
