use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use failure::Error;
use serde_json::Value;

use crate::annotate::{self, Annotation};
use crate::config::Config;
use crate::error::ExtractError;
use crate::formatting::{format_offset, human_readable_coordinate, human_readable_time};
use crate::frame;
use crate::metadata_extractor::TelemetrySource;
use crate::track::{GpsSample, GpsTrack, Interpolation};

/// Everything needed for one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub video: PathBuf,
    pub timestamp: Duration,
    /// Image to stamp the fix onto
    pub image: Option<PathBuf>,
    /// Write the stamped image here rather than over `image`
    pub output: Option<PathBuf>,
    /// Pull a still out of the video to stamp when no image was given
    pub extract_frame: bool,
    pub interpolation: Interpolation,
    pub allow_no_fix: bool,
    pub make: String,
    pub ffmpeg: String,
}

impl Request {
    /// A request with every knob taken from the config.
    pub fn from_config<P: Into<PathBuf>>(cfg: &Config, video: P, timestamp: Duration) -> Request {
        Request {
            video: video.into(),
            timestamp,
            image: None,
            output: None,
            extract_frame: false,
            interpolation: cfg.interpolation(),
            allow_no_fix: cfg.allow_no_fix(),
            make: cfg.make().to_string(),
            ffmpeg: cfg.ffmpeg().to_string(),
        }
    }
}

/// The answer to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub requested: Duration,
    pub sample: GpsSample,
    pub interpolation: Interpolation,
    pub device_name: Option<String>,
    /// The image the fix was written into, if any
    pub annotated: Option<PathBuf>,
}

impl Coordinate {
    pub fn to_plaintext(&self) -> String {
        let s = &self.sample;
        let mut out = String::new();
        out.push_str(&format!("timestamp: {}\n", format_offset(self.requested)));
        if s.offset != self.requested {
            out.push_str(&format!("sample:    {}\n", format_offset(s.offset)));
        }
        out.push_str(&format!("latitude:  {:.7}\n", s.latitude));
        out.push_str(&format!("longitude: {:.7}\n", s.longitude));
        if let Some(altitude) = s.altitude {
            out.push_str(&format!("altitude:  {:.3}m\n", altitude));
        }
        out.push_str(&format!("position:  {}\n", human_readable_coordinate(s.latitude, s.longitude)));
        if let Some(utc) = s.utc {
            out.push_str(&format!("utc:       {}\n", utc.format("%Y-%m-%d %H:%M:%S%.3f")));
        }
        if let Some(ref device) = self.device_name {
            out.push_str(&format!("device:    {}\n", device));
        }
        if let Some(ref image) = self.annotated {
            out.push_str(&format!("image:     {}\n", image.display()));
        }
        out
    }

    pub fn to_json(&self) -> Value {
        let mut value = sample_json(&self.sample);
        value["timestamp"] = json!(format_offset(self.requested));
        value["interpolation"] = json!(self.interpolation.to_string());
        value["device"] = json!(self.device_name);
        value["image"] = json!(self.annotated.as_ref().map(|p| p.display().to_string()));
        value
    }
}

/// A sample as JSON, shared with the telemetry dump.
pub fn sample_json(sample: &GpsSample) -> Value {
    json!({
        "offset": format_offset(sample.offset),
        "offset_seconds": sample.offset.as_secs_f64(),
        "latitude": sample.latitude,
        "longitude": sample.longitude,
        "altitude": sample.altitude,
        "speed_2d": sample.speed_2d,
        "fix": sample.fix,
        "dop": sample.dop,
        "utc": sample.utc.map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
    })
}

fn check_video(video: &Path) -> Result<(), ExtractError> {
    if !video.is_file() || File::open(video).is_err() {
        return Err(ExtractError::video_not_found(video));
    }
    Ok(())
}

/// Pull the telemetry for a video and turn it into a usable track, refusing tracks with nothing
/// in them.
pub fn load_track<S: TelemetrySource + ?Sized>(
    source: &S,
    video: &Path,
    allow_no_fix: bool,
) -> Result<GpsTrack, Error> {
    check_video(video)?;
    extract_track(source, video, allow_no_fix)
}

fn extract_track<S: TelemetrySource + ?Sized>(
    source: &S,
    video: &Path,
    allow_no_fix: bool,
) -> Result<GpsTrack, Error> {
    info!("Extracting telemetry from {:?}", video);
    let telemetry = source.telemetry(video)?;
    let track = GpsTrack::from_telemetry(&telemetry, allow_no_fix)?;
    if track.is_empty() {
        return Err(ExtractError::no_telemetry(video).into());
    }
    info!(
        "Found {} GPS fixes across {} of footage",
        track.samples().len(),
        human_readable_time(track.recorded_duration())
    );
    Ok(track)
}

/// Run one request end to end: validate, extract, look up, and optionally stamp an image.
pub fn run<S: TelemetrySource + ?Sized>(source: &S, request: &Request) -> Result<Coordinate, Error> {
    check_video(&request.video)?;
    if let Some(ref image) = request.image {
        if !image.is_file() {
            return Err(ExtractError::image_not_found(image).into());
        }
    }

    let track = extract_track(source, &request.video, request.allow_no_fix)?;

    info!(
        "Searching for {} ({} lookup)",
        format_offset(request.timestamp),
        request.interpolation
    );
    let sample = track.locate(request.timestamp, request.interpolation)?;
    debug!("Matched {:?}", &sample);

    let target = match request.image {
        Some(ref image) => Some(image.clone()),
        None if request.extract_frame => Some(frame::extract_frame(&request.ffmpeg, &request.video, request.timestamp)?),
        None => None,
    };

    let annotated = match target {
        Some(image) => {
            let annotation = Annotation {
                latitude: sample.latitude,
                longitude: sample.longitude,
                altitude: sample.altitude,
                make: request.make.clone(),
                model: track.device_name().map(|s| s.to_string()),
            };
            Some(annotate::annotate_image(&image, request.output.as_ref().map(|p| p.as_path()), &annotation)?)
        }
        None => {
            debug!("No image to annotate");
            None
        }
    };

    Ok(Coordinate {
        requested: request.timestamp,
        sample,
        interpolation: request.interpolation,
        device_name: track.device_name().map(|s| s.to_string()),
        annotated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_extractor::{TelemetryChunk, VideoTelemetry};
    use crate::test_helpers::{klv, container, tempdir, three_second_telemetry, FakeSource};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::fs;

    fn video(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("GH010042.MP4");
        fs::write(&path, b"not really an mp4").unwrap();
        path
    }

    fn request(video: PathBuf, millis: u64) -> Request {
        Request::from_config(&Config::default(), video, Duration::from_millis(millis))
    }

    fn extract_error(err: &Error) -> &ExtractError {
        err.downcast_ref::<ExtractError>().expect("an ExtractError")
    }

    #[test]
    fn test_missing_video_fails_before_extraction() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());
        let missing = dir.path().join("missing.mp4");

        let err = run(&source, &request(missing.clone(), 0)).unwrap_err();

        assert_eq!(extract_error(&err), &ExtractError::video_not_found(&missing));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_load_track_rejects_missing_video() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());
        let missing = dir.path().join("missing.mp4");

        let err = load_track(&source, &missing, false).unwrap_err();
        assert_eq!(extract_error(&err), &ExtractError::video_not_found(&missing));
        assert_eq!(source.calls(), 0);

        let track = load_track(&source, &video(&dir), false).unwrap();
        assert_eq!(track.samples().len(), 6);
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn test_directory_is_not_a_video() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());

        let err = run(&source, &request(dir.path().to_path_buf(), 0)).unwrap_err();
        assert_eq!(extract_error(&err), &ExtractError::video_not_found(dir.path()));
    }

    #[test]
    fn test_missing_image_fails_before_extraction() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());
        let mut req = request(video(&dir), 500);
        req.image = Some(dir.path().join("nope.jpg"));

        let err = run(&source, &req).unwrap_err();
        assert_eq!(extract_error(&err), &ExtractError::image_not_found(&dir.path().join("nope.jpg")));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn test_no_gps_stream() {
        let dir = tempdir();
        let video = video(&dir);
        let accl = klv(b"ACCL", b's', 6, 1, &[0, 1, 0, 2, 0, 3]);
        let source = FakeSource::new(VideoTelemetry {
            duration: Some(Duration::from_secs(1)),
            chunks: vec![TelemetryChunk {
                start: Duration::from_secs(0),
                duration: Duration::from_secs(1),
                payload: container(b"DEVC", &[container(b"STRM", &[accl])]),
            }],
        });

        let err = run(&source, &request(video.clone(), 0)).unwrap_err();
        assert_eq!(extract_error(&err), &ExtractError::no_telemetry(&video));
    }

    #[test]
    fn test_out_of_range() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());

        let err = run(&source, &request(video(&dir), 3_500)).unwrap_err();
        match extract_error(&err) {
            ExtractError::TimestampOutOfRange { requested, limit } => {
                assert_eq!(requested, "00:00:03.500");
                assert_eq!(limit, "00:00:03.000");
            }
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn test_finds_fix() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());

        let coord = run(&source, &request(video(&dir), 1_400)).unwrap();

        assert_eq!(coord.sample.latitude, 11.5);
        assert_eq!(coord.sample.offset, Duration::from_millis(1_500));
        assert_eq!(coord.device_name.as_deref(), Some("HERO8 Black"));
        assert_eq!(coord.annotated, None);
        assert!(coord.to_plaintext().contains("latitude:  11.5000000"));
        assert_eq!(coord.to_json()["interpolation"], json!("nearest"));
        assert_eq!(coord.to_json()["timestamp"], json!("00:00:01.400"));
    }

    #[test]
    fn test_identical_requests_identical_output() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());
        let mut req = request(video(&dir), 2_100);
        req.interpolation = Interpolation::Linear;

        let first = run(&source, &req).unwrap();
        let second = run(&source, &req).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_json(), second.to_json());
        assert_eq!(first.to_plaintext(), second.to_plaintext());
    }

    #[test]
    fn test_annotates_image() {
        let dir = tempdir();
        let source = FakeSource::new(three_second_telemetry());
        let still = dir.path().join("still.png");
        let out = dir.path().join("still-gps.jpg");
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(dir.path().join("still.jpg")).unwrap();
        fs::rename(dir.path().join("still.jpg"), &still).unwrap();

        let mut req = request(video(&dir), 500);
        req.image = Some(still.clone());
        req.output = Some(out.clone());

        let coord = run(&source, &req).unwrap();

        assert_eq!(coord.annotated, Some(out.clone()));
        assert!(out.is_file());
        // The misleading extension doesn't matter, the content decides the format
        assert_eq!(annotate::inspect(&still).unwrap(), ImageFormat::Jpeg);
        assert_eq!(annotate::inspect(&out).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_request_takes_config() {
        let cfg = Config::from_str(
            r#"
[tools]
ffmpeg = "/opt/bin/ffmpeg"

[lookup]
interpolation = "linear"
allow_no_fix = true
"#,
        )
        .unwrap();
        let req = Request::from_config(&cfg, "a.mp4", Duration::from_secs(1));
        assert_eq!(req.interpolation, Interpolation::Linear);
        assert!(req.allow_no_fix);
        assert_eq!(req.ffmpeg, "/opt/bin/ffmpeg");
        assert_eq!(req.make, "GoPro");
    }
}
