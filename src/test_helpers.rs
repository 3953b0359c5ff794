use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use failure::Error;

use crate::metadata_extractor::{TelemetryChunk, TelemetrySource, VideoTelemetry};

/// Encode a single GPMF record, padding the payload out to a 4 byte boundary.
pub(crate) fn klv(key: &[u8; 4], value_type: u8, size: u8, repeat: u16, data: &[u8]) -> Vec<u8> {
    assert_eq!(data.len(), size as usize * repeat as usize, "payload doesn't match header");
    let mut out = Vec::with_capacity(8 + data.len() + 3);
    out.extend_from_slice(key);
    out.push(value_type);
    out.push(size);
    out.extend_from_slice(&repeat.to_be_bytes());
    out.extend_from_slice(data);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

/// Encode a container record around some already encoded children.
pub(crate) fn container(key: &[u8; 4], children: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = children.iter().flatten().cloned().collect();
    klv(key, 0, 4, (body.len() / 4) as u16, &body)
}

fn i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes().to_vec()).collect()
}

pub(crate) struct Gps5Stream<'a> {
    pub device_name: Option<&'a str>,
    pub utc: Option<&'a str>,
    pub fix: Option<u32>,
    /// DOP * 100
    pub precision: Option<u16>,
    /// latitude, longitude, altitude, 2D speed
    pub samples: Vec<(f64, f64, f64, f64)>,
}

/// Build a DEVC payload the way a HERO5 through HERO10 lays out its GPS stream.
pub(crate) fn gps5_payload(stream: &Gps5Stream<'_>) -> Vec<u8> {
    let mut records = vec![];
    if let Some(utc) = stream.utc {
        records.push(klv(b"GPSU", b'U', 16, 1, utc.as_bytes()));
    }
    if let Some(fix) = stream.fix {
        records.push(klv(b"GPSF", b'L', 4, 1, &fix.to_be_bytes()));
    }
    if let Some(precision) = stream.precision {
        records.push(klv(b"GPSP", b'S', 2, 1, &precision.to_be_bytes()));
    }
    records.push(klv(b"SCAL", b'l', 4, 5, &i32s(&[10_000_000, 10_000_000, 1000, 1000, 100])));

    let mut data = vec![];
    for (lat, lon, alt, speed) in &stream.samples {
        data.extend(i32s(&[
            (lat * 1e7).round() as i32,
            (lon * 1e7).round() as i32,
            (alt * 1e3).round() as i32,
            (speed * 1e3).round() as i32,
            (speed * 1e2).round() as i32,
        ]));
    }
    records.push(klv(b"GPS5", b'l', 20, stream.samples.len() as u16, &data));

    let mut devc = vec![];
    if let Some(name) = stream.device_name {
        devc.push(klv(b"DVNM", b'c', 1, name.len() as u16, name.as_bytes()));
    }
    devc.push(container(b"STRM", &records));
    container(b"DEVC", &devc)
}

/// Build a DEVC payload with a GPS9 stream, as newer cameras write. Samples are latitude,
/// longitude, altitude, 2D speed, days since 2000, seconds since midnight, DOP * 100, fix.
pub(crate) fn gps9_payload(device_name: &str, samples: &[(f64, f64, f64, f64, i32, f64, u16, u16)]) -> Vec<u8> {
    let mut data = vec![];
    for (lat, lon, alt, speed, days, secs, dop, fix) in samples {
        data.extend(i32s(&[
            (lat * 1e7).round() as i32,
            (lon * 1e7).round() as i32,
            (alt * 1e3).round() as i32,
            (speed * 1e3).round() as i32,
            (speed * 1e2).round() as i32,
            *days,
            (secs * 1e3).round() as i32,
        ]));
        data.extend_from_slice(&dop.to_be_bytes());
        data.extend_from_slice(&fix.to_be_bytes());
    }

    let records = vec![
        klv(b"TYPE", b'c', 1, 9, b"lllllllSS"),
        klv(
            b"SCAL",
            b'l',
            4,
            9,
            &i32s(&[10_000_000, 10_000_000, 1000, 1000, 100, 1, 1000, 100, 1]),
        ),
        klv(b"GPS9", b'?', 32, samples.len() as u16, &data),
    ];

    container(
        b"DEVC",
        &[
            klv(b"DVNM", b'c', 1, device_name.len() as u16, device_name.as_bytes()),
            container(b"STRM", &records),
        ],
    )
}

/// A one second chunk starting at `start_secs` holding the given fixes.
pub(crate) fn gps5_chunk(start_secs: u64, samples: Vec<(f64, f64, f64, f64)>) -> TelemetryChunk {
    TelemetryChunk {
        start: Duration::from_secs(start_secs),
        duration: Duration::from_secs(1),
        payload: gps5_payload(&Gps5Stream {
            device_name: Some("HERO8 Black"),
            utc: None,
            fix: Some(3),
            precision: Some(200),
            samples,
        }),
    }
}

/// Three seconds of telemetry heading north at 2Hz.
pub(crate) fn three_second_telemetry() -> VideoTelemetry {
    VideoTelemetry {
        duration: Some(Duration::from_secs(3)),
        chunks: vec![
            gps5_chunk(0, vec![(10.0, 20.0, 100.0, 1.0), (10.5, 20.0, 101.0, 1.0)]),
            gps5_chunk(1, vec![(11.0, 20.0, 102.0, 1.0), (11.5, 20.0, 103.0, 1.0)]),
            gps5_chunk(2, vec![(12.0, 20.0, 104.0, 1.0), (12.5, 20.0, 105.0, 1.0)]),
        ],
    }
}

/// Hands out canned telemetry and counts how often it was asked.
pub(crate) struct FakeSource {
    telemetry: VideoTelemetry,
    calls: Cell<usize>,
}

impl FakeSource {
    pub(crate) fn new(telemetry: VideoTelemetry) -> FakeSource {
        FakeSource {
            telemetry,
            calls: Cell::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TelemetrySource for FakeSource {
    fn telemetry(&self, _video: &Path) -> Result<VideoTelemetry, Error> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.telemetry.clone())
    }
}

pub(crate) fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}
