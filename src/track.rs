use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use failure::Error;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::gpmf;
use crate::metadata_extractor::VideoTelemetry;

/// How to pick a coordinate for a timestamp that falls between two recorded fixes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// The closest recorded fix, the earlier one on a tie
    Nearest,
    /// A straight line between the fixes either side
    Linear,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Nearest
    }
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match &s.to_ascii_lowercase()[..] {
            "nearest" => Ok(Interpolation::Nearest),
            "linear" => Ok(Interpolation::Linear),
            other => Err(format_err!("Unknown interpolation {:?}, expected nearest or linear", other)),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Nearest => write!(f, "nearest"),
            Interpolation::Linear => write!(f, "linear"),
        }
    }
}

/// A GPS reading placed on the video's timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsSample {
    pub offset: Duration,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed_2d: Option<f64>,
    pub fix: Option<u8>,
    pub dop: Option<f64>,
    pub utc: Option<NaiveDateTime>,
}

/// Longitudes run eastward from `min_longitude` to `max_longitude`, so a box that crosses the
/// antimeridian has `min_longitude > max_longitude`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Bounds {
    pub fn crosses_antimeridian(&self) -> bool {
        self.min_longitude > self.max_longitude
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let longitude_ok = self.contains_longitude(longitude)
            // 180 and -180 are the same meridian
            || (longitude.abs() == 180.0 && self.contains_longitude(-longitude));
        latitude >= self.min_latitude && latitude <= self.max_latitude && longitude_ok
    }

    fn contains_longitude(&self, longitude: f64) -> bool {
        if self.crosses_antimeridian() {
            longitude >= self.min_longitude || longitude <= self.max_longitude
        } else {
            longitude >= self.min_longitude && longitude <= self.max_longitude
        }
    }
}

/// Map a longitude in [0, 360) back onto (-180, 180].
fn unshift_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else {
        longitude
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsTrack {
    device_name: Option<String>,
    samples: Vec<GpsSample>,
    recorded: Duration,
}

fn offset_within(start: Duration, duration: Duration, index: usize, count: usize) -> Duration {
    if count == 0 {
        return start;
    }
    start + duration * index as u32 / count as u32
}

fn utc_at(base: Option<NaiveDateTime>, delta: Duration) -> Option<NaiveDateTime> {
    let delta = ChronoDuration::from_std(delta).ok()?;
    base?.checked_add_signed(delta)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Longitude interpolation that takes the short way round the antimeridian.
fn lerp_longitude(a: f64, b: f64, t: f64) -> f64 {
    let mut delta = b - a;
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    let mut out = a + delta * t;
    if out > 180.0 {
        out -= 360.0;
    } else if out < -180.0 {
        out += 360.0;
    }
    out
}

fn lerp_option(a: Option<f64>, b: Option<f64>, t: f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(lerp(a, b, t)),
        _ => None,
    }
}

impl GpsTrack {
    /// Decode every chunk of telemetry and lay the fixes out along the timeline. Fixes in a chunk
    /// are spread evenly across the time the chunk covers.
    pub fn from_telemetry(telemetry: &VideoTelemetry, allow_no_fix: bool) -> Result<GpsTrack, ExtractError> {
        let mut device_name = None;
        let mut samples = vec![];
        let mut dropped = 0;

        for chunk in &telemetry.chunks {
            let decoded = gpmf::decode_gps(&chunk.payload)?;
            if device_name.is_none() {
                device_name = decoded.device_name.clone();
            }
            let base_utc = decoded.utc;
            let count = decoded.fixes.len();
            for (i, fix) in decoded.fixes.into_iter().enumerate() {
                if !allow_no_fix && fix.fix.map(|f| f < 2).unwrap_or(false) {
                    dropped += 1;
                    continue;
                }
                let offset = offset_within(chunk.start, chunk.duration, i, count);
                let utc = fix.utc.or_else(|| utc_at(base_utc, offset - chunk.start));
                samples.push(GpsSample {
                    offset,
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                    altitude: Some(fix.altitude),
                    speed_2d: Some(fix.speed_2d),
                    fix: fix.fix,
                    dop: fix.dop,
                    utc,
                });
            }
        }

        if dropped > 0 {
            info!("Dropped {} fixes recorded without a GPS lock", dropped);
        }
        samples.sort_by(|a, b| a.offset.cmp(&b.offset));

        let recorded = telemetry
            .duration
            .or_else(|| telemetry.chunks.iter().map(|c| c.end()).max())
            .unwrap_or_default();

        Ok(GpsTrack {
            device_name,
            samples,
            recorded,
        })
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_ref().map(|s| &s[..])
    }

    pub fn samples(&self) -> &[GpsSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the recording the track belongs to.
    pub fn recorded_duration(&self) -> Duration {
        self.recorded
    }

    /// The box every recorded fix falls inside. When the fixes sit either side of the
    /// antimeridian the narrower box across it is returned.
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.samples.first()?;
        let mut bounds = Bounds {
            min_latitude: first.latitude,
            max_latitude: first.latitude,
            min_longitude: first.longitude,
            max_longitude: first.longitude,
        };
        let mut west = first.longitude.rem_euclid(360.0);
        let mut east = west;

        for s in &self.samples {
            bounds.min_latitude = bounds.min_latitude.min(s.latitude);
            bounds.max_latitude = bounds.max_latitude.max(s.latitude);
            bounds.min_longitude = bounds.min_longitude.min(s.longitude);
            bounds.max_longitude = bounds.max_longitude.max(s.longitude);

            let shifted = s.longitude.rem_euclid(360.0);
            west = west.min(shifted);
            east = east.max(shifted);
        }

        if east - west < bounds.max_longitude - bounds.min_longitude {
            bounds.min_longitude = unshift_longitude(west);
            bounds.max_longitude = unshift_longitude(east);
        }
        Some(bounds)
    }

    /// Find the coordinate for `at`. The timestamp has to fall inside the recording.
    pub fn locate(&self, at: Duration, policy: Interpolation) -> Result<GpsSample, ExtractError> {
        if at > self.recorded {
            return Err(ExtractError::out_of_range(at, self.recorded));
        }

        let (before, after) = match self.samples.binary_search_by(|s| s.offset.cmp(&at)) {
            Ok(i) => return Ok(self.samples[i].clone()),
            Err(i) => (i.checked_sub(1).map(|i| &self.samples[i]), self.samples.get(i)),
        };

        let sample = match (before, after) {
            (Some(before), Some(after)) => match policy {
                Interpolation::Nearest => {
                    if at - before.offset <= after.offset - at {
                        before.clone()
                    } else {
                        after.clone()
                    }
                }
                Interpolation::Linear => interpolate(before, after, at),
            },
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => return Err(ExtractError::NoTelemetry("empty GPS track".into())),
        };
        Ok(sample)
    }
}

fn interpolate(before: &GpsSample, after: &GpsSample, at: Duration) -> GpsSample {
    let span = (after.offset - before.offset).as_secs_f64();
    let t = if span > 0.0 {
        (at - before.offset).as_secs_f64() / span
    } else {
        0.0
    };

    GpsSample {
        offset: at,
        latitude: lerp(before.latitude, after.latitude, t),
        longitude: lerp_longitude(before.longitude, after.longitude, t),
        altitude: lerp_option(before.altitude, after.altitude, t),
        speed_2d: lerp_option(before.speed_2d, after.speed_2d, t),
        fix: match (before.fix, after.fix) {
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        },
        dop: match (before.dop, after.dop) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        },
        utc: utc_at(before.utc, at - before.offset),
    }
}
