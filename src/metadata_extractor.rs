//! Extract the telemetry track from a given mp4 file. The plausible rust container crates still
//! don't expose GoPro's data track in a way we can use, so we're shelling out to `ffprobe` and
//! `ffmpeg`, but doing so behind a coherent API so that one day we can swap in the better thing.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Output};
use std::time::Duration;

use failure::Error;
use serde::Deserialize;

use crate::config::Config;
use crate::error::ExtractError;

/// One packet of the telemetry track.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryChunk {
    /// Offset of the first sample in the packet
    pub start: Duration,
    /// How much video time the packet covers
    pub duration: Duration,
    /// Raw GPMF bytes
    pub payload: Vec<u8>,
}

impl TelemetryChunk {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTelemetry {
    /// Container duration, if the container reported one.
    pub duration: Option<Duration>,
    pub chunks: Vec<TelemetryChunk>,
}

/// Anything that can hand us the telemetry packets for a video.
pub trait TelemetrySource {
    fn telemetry(&self, video: &Path) -> Result<VideoTelemetry, Error>;
}

/// The real source, driving ffprobe to find the track and ffmpeg to dump it.
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    ffmpeg: String,
    ffprobe: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize, Debug)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_tag_string: Option<String>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Deserialize, Debug)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct PacketTable {
    #[serde(default)]
    packets: Vec<ProbePacket>,
}

#[derive(Deserialize, Debug)]
struct ProbePacket {
    pts_time: Option<String>,
    duration_time: Option<String>,
    size: Option<String>,
}

fn seconds(value: &Option<String>) -> Option<Duration> {
    let secs = value.as_ref()?.trim().parse::<f64>().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

impl ProbeStream {
    fn is_telemetry(&self) -> bool {
        if self.codec_tag_string.as_ref().map(|t| t == "gpmd").unwrap_or(false) {
            return true;
        }
        let is_data = self.codec_type.as_ref().map(|t| t == "data").unwrap_or(false);
        let handler = self.tags.get("handler_name").map(|h| h.contains("GoPro MET")).unwrap_or(false);
        is_data && handler
    }
}

impl ProbeOutput {
    pub fn from_json(body: &[u8]) -> Result<ProbeOutput, Error> {
        serde_json::from_slice(body).map_err(|e| format_err!("Couldn't parse ffprobe output: {}", e))
    }

    /// Index of the GPMF data stream, if the container has one.
    pub fn telemetry_stream(&self) -> Option<u32> {
        self.streams.iter().find(|s| s.is_telemetry()).map(|s| s.index)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.format.as_ref().and_then(|f| seconds(&f.duration))
    }
}

impl PacketTable {
    pub fn from_json(body: &[u8]) -> Result<PacketTable, Error> {
        serde_json::from_slice(body).map_err(|e| format_err!("Couldn't parse ffprobe packet table: {}", e))
    }

    /// Cut a raw dump of the telemetry stream back into its packets.
    pub fn split(&self, raw: &[u8]) -> Result<Vec<TelemetryChunk>, ExtractError> {
        let mut out: Vec<TelemetryChunk> = Vec::with_capacity(self.packets.len());
        let mut offset = 0;

        for (i, packet) in self.packets.iter().enumerate() {
            let size = packet
                .size
                .as_ref()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| ExtractError::CorruptContainer(format!("packet {} has no size", i)))?;
            if offset + size > raw.len() {
                return Err(ExtractError::CorruptContainer(format!(
                    "packet {} runs past the end of the telemetry stream ({} + {} > {})",
                    i,
                    offset,
                    size,
                    raw.len()
                )));
            }

            let start = seconds(&packet.pts_time)
                .or_else(|| out.last().map(|c| c.end()))
                .unwrap_or_default();
            let duration = seconds(&packet.duration_time)
                .or_else(|| self.packets.get(i + 1).and_then(|next| seconds(&next.pts_time)).map(|next| {
                    if next > start {
                        next - start
                    } else {
                        Duration::default()
                    }
                }))
                .or_else(|| out.last().map(|c| c.duration))
                .unwrap_or_default();

            out.push(TelemetryChunk {
                start,
                duration,
                payload: raw[offset..offset + size].to_vec(),
            });
            offset += size;
        }

        if offset < raw.len() {
            warn!("{} bytes of telemetry weren't claimed by any packet", raw.len() - offset);
        }
        Ok(out)
    }
}

impl FfmpegSource {
    pub fn new<S: Into<String>>(ffmpeg: S, ffprobe: S) -> FfmpegSource {
        FfmpegSource {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> FfmpegSource {
        FfmpegSource::new(cfg.ffmpeg().to_string(), cfg.ffprobe().to_string())
    }

    fn execute(&self, tool: &str, command: &mut Command) -> Result<Output, ExtractError> {
        debug!("Running {:?}", command);
        let output = command.output().map_err(|e| ExtractError::Tool {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(ExtractError::CorruptContainer(format!(
                "{} failed: {}",
                tool,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output)
    }

    pub fn probe(&self, video: &Path) -> Result<ProbeOutput, Error> {
        let output = self.execute(
            &self.ffprobe,
            Command::new(&self.ffprobe)
                .arg("-v").arg("error")
                .arg("-print_format").arg("json")
                .arg("-show_format")
                .arg("-show_streams")
                .arg(video),
        )?;
        ProbeOutput::from_json(&output.stdout)
    }

    pub fn packets(&self, video: &Path, stream: u32) -> Result<PacketTable, Error> {
        let output = self.execute(
            &self.ffprobe,
            Command::new(&self.ffprobe)
                .arg("-v").arg("error")
                .arg("-select_streams").arg(stream.to_string())
                .arg("-show_entries").arg("packet=pts_time,duration_time,size")
                .arg("-print_format").arg("json")
                .arg(video),
        )?;
        PacketTable::from_json(&output.stdout)
    }

    pub fn dump_stream(&self, video: &Path, stream: u32) -> Result<Vec<u8>, Error> {
        let output = self.execute(
            &self.ffmpeg,
            Command::new(&self.ffmpeg)
                .arg("-y")
                .arg("-v").arg("error")
                .arg("-i").arg(video)
                .arg("-codec").arg("copy")
                .arg("-map").arg(format!("0:{}", stream))
                .arg("-f").arg("rawvideo")
                .arg("-"),
        )?;
        Ok(output.stdout)
    }
}

impl TelemetrySource for FfmpegSource {
    fn telemetry(&self, video: &Path) -> Result<VideoTelemetry, Error> {
        let probe = self.probe(video)?;
        let stream = probe
            .telemetry_stream()
            .ok_or_else(|| ExtractError::no_telemetry(video))?;
        debug!("Telemetry is stream {} of {:?}", stream, video);

        let table = self.packets(video, stream)?;
        let raw = self.dump_stream(video, stream)?;
        info!("Read {} bytes of telemetry in {} packets", raw.len(), table.packets.len());

        Ok(VideoTelemetry {
            duration: probe.duration(),
            chunks: table.split(&raw)?,
        })
    }
}
