//! Just enough of a GPMF reader to get GPS fixes out of a telemetry payload.
//!
//! GPMF is a stream of key-length-value records. Every record has an 8 byte header: a four
//! character key, a one byte type, a one byte structure size and a big endian u16 repeat count.
//! The payload is `size * repeat` bytes, padded out to a 4 byte boundary. A type of zero marks a
//! container whose payload is itself a sequence of records.

use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};

use crate::error::ExtractError;

const HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Eq, PartialEq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const DEVC: FourCC = FourCC(*b"DEVC");
    pub const DVNM: FourCC = FourCC(*b"DVNM");
    pub const STRM: FourCC = FourCC(*b"STRM");
    pub const SCAL: FourCC = FourCC(*b"SCAL");
    pub const TYPE: FourCC = FourCC(*b"TYPE");
    pub const GPS5: FourCC = FourCC(*b"GPS5");
    pub const GPS9: FourCC = FourCC(*b"GPS9");
    pub const GPSF: FourCC = FourCC(*b"GPSF");
    pub const GPSP: FourCC = FourCC(*b"GPSP");
    pub const GPSU: FourCC = FourCC(*b"GPSU");

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single record, borrowing its payload from the buffer it was parsed out of.
#[derive(Debug, Clone)]
pub struct Klv<'a> {
    pub key: FourCC,
    pub value_type: u8,
    pub struct_size: u8,
    pub repeat: u16,
    pub data: &'a [u8],
}

fn corrupt<T: Into<String>>(msg: T) -> ExtractError {
    ExtractError::CorruptContainer(msg.into())
}

/// Split a buffer into the records at one level of nesting.
pub fn parse_klvs(bytes: &[u8]) -> Result<Vec<Klv<'_>>, ExtractError> {
    let mut out = vec![];
    let mut offset = 0;

    while offset < bytes.len() {
        // Trailing zero padding is legal
        if bytes[offset..].iter().all(|b| *b == 0) {
            break;
        }
        if bytes.len() - offset < HEADER_LEN {
            return Err(corrupt(format!("truncated KLV header at byte {}", offset)));
        }
        let header = &bytes[offset..offset + HEADER_LEN];
        let key = FourCC([header[0], header[1], header[2], header[3]]);
        let value_type = header[4];
        let struct_size = header[5];
        let repeat = u16::from_be_bytes([header[6], header[7]]);

        let len = struct_size as usize * repeat as usize;
        let start = offset + HEADER_LEN;
        let end = start + len;
        if end > bytes.len() {
            return Err(corrupt(format!(
                "{:?} claims {} bytes but only {} remain",
                key,
                len,
                bytes.len() - start
            )));
        }

        out.push(Klv {
            key,
            value_type,
            struct_size,
            repeat,
            data: &bytes[start..end],
        });

        let padded = (len + 3) & !3;
        offset = start + padded;
    }

    Ok(out)
}

impl<'a> Klv<'a> {
    pub fn is_container(&self) -> bool {
        self.value_type == 0
    }

    pub fn children(&self) -> Result<Vec<Klv<'a>>, ExtractError> {
        if !self.is_container() {
            return Err(corrupt(format!("{:?} is not a container", self.key)));
        }
        parse_klvs(self.data)
    }

    /// Payload as text, with trailing NULs dropped.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.data)
            .trim_end_matches('\0')
            .to_string()
    }

    /// Decode every value in the payload as a float, assuming a single scalar type.
    pub fn as_numbers(&self) -> Result<Vec<f64>, ExtractError> {
        let width = type_width(self.value_type)
            .ok_or_else(|| corrupt(format!("{:?} has non-numeric type {:?}", self.key, self.value_type as char)))?;
        let count = self.data.len() / width;
        let mut cursor = Cursor::new(self.data);
        (0..count)
            .map(|_| read_number(&mut cursor, self.value_type))
            .collect()
    }
}

fn type_width(value_type: u8) -> Option<usize> {
    match value_type {
        b'b' | b'B' => Some(1),
        b's' | b'S' => Some(2),
        b'l' | b'L' | b'f' => Some(4),
        b'd' | b'j' | b'J' => Some(8),
        _ => None,
    }
}

fn read_number(cursor: &mut Cursor<&[u8]>, value_type: u8) -> Result<f64, ExtractError> {
    let value = match value_type {
        b'b' => cursor.read_i8().map(f64::from),
        b'B' => cursor.read_u8().map(f64::from),
        b's' => cursor.read_i16::<BigEndian>().map(f64::from),
        b'S' => cursor.read_u16::<BigEndian>().map(f64::from),
        b'l' => cursor.read_i32::<BigEndian>().map(f64::from),
        b'L' => cursor.read_u32::<BigEndian>().map(f64::from),
        b'f' => cursor.read_f32::<BigEndian>().map(f64::from),
        b'd' => cursor.read_f64::<BigEndian>(),
        b'j' => cursor.read_i64::<BigEndian>().map(|v| v as f64),
        b'J' => cursor.read_u64::<BigEndian>().map(|v| v as f64),
        other => return Err(corrupt(format!("unsupported value type {:?}", other as char))),
    };
    value.map_err(|e| corrupt(format!("short read: {}", e)))
}

/// One GPS reading as the camera recorded it, already scaled into real units.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// Ground speed in m/s
    pub speed_2d: f64,
    /// 0 none, 2 2D, 3 3D
    pub fix: Option<u8>,
    pub dop: Option<f64>,
    /// Only GPS9 carries a per sample time; GPS5 streams get theirs from the payload's GPSU.
    pub utc: Option<NaiveDateTime>,
}

/// The GPS content of one telemetry payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsPayload {
    pub device_name: Option<String>,
    /// Time of the first fix in the payload
    pub utc: Option<NaiveDateTime>,
    pub fixes: Vec<GpsFix>,
}

/// Per stream state that applies to whichever sensor record it accompanies.
#[derive(Debug, Default)]
struct StreamContext {
    scale: Vec<f64>,
    type_desc: Option<Vec<u8>>,
    fix: Option<u8>,
    dop: Option<f64>,
    utc: Option<NaiveDateTime>,
}

impl StreamContext {
    fn scale_for(&self, index: usize) -> f64 {
        let scale = match self.scale.len() {
            0 => 1.0,
            1 => self.scale[0],
            _ => self.scale.get(index).cloned().unwrap_or(1.0),
        };
        if scale == 0.0 {
            1.0
        } else {
            scale
        }
    }
}

/// Pull every GPS fix out of a payload. Payloads without GPS streams decode to an empty fix list.
///
/// Cameras that write both a GPS9 and a GPS5 stream record the same fixes twice, so only the
/// GPS9 fixes are kept when there are any.
pub fn decode_gps(payload: &[u8]) -> Result<GpsPayload, ExtractError> {
    let mut out = GpsPayload::default();
    let mut streams = GpsStreams::default();

    for device in parse_klvs(payload)? {
        if device.key != FourCC::DEVC {
            continue;
        }
        for record in device.children()? {
            match record.key {
                FourCC::DVNM => out.device_name = Some(record.as_string()),
                FourCC::STRM => decode_stream(&record, &mut out, &mut streams)?,
                _ => {}
            }
        }
    }

    out.fixes = if streams.gps9.is_empty() {
        streams.gps5
    } else {
        if !streams.gps5.is_empty() {
            debug!("Ignoring {} GPS5 fixes in favour of GPS9", streams.gps5.len());
        }
        streams.gps9
    };
    Ok(out)
}

#[derive(Debug, Default)]
struct GpsStreams {
    gps5: Vec<GpsFix>,
    gps9: Vec<GpsFix>,
}

fn decode_stream(stream: &Klv<'_>, out: &mut GpsPayload, streams: &mut GpsStreams) -> Result<(), ExtractError> {
    let records = stream.children()?;
    let mut ctx = StreamContext::default();

    for record in &records {
        match record.key {
            FourCC::SCAL => ctx.scale = record.as_numbers()?,
            FourCC::TYPE => ctx.type_desc = Some(record.data.iter().cloned().filter(|b| *b != 0).collect()),
            FourCC::GPSF => ctx.fix = record.as_numbers()?.first().map(|f| *f as u8),
            FourCC::GPSP => ctx.dop = record.as_numbers()?.first().map(|p| p / 100.0),
            FourCC::GPSU => ctx.utc = parse_gpsu(&record.as_string()),
            _ => {}
        }
    }

    for record in &records {
        match record.key {
            FourCC::GPS5 => {
                if out.utc.is_none() {
                    out.utc = ctx.utc;
                }
                streams.gps5.extend(decode_gps5(record, &ctx)?);
            }
            FourCC::GPS9 => streams.gps9.extend(decode_gps9(record, &ctx)?),
            _ => {}
        }
    }

    Ok(())
}

fn decode_gps5(record: &Klv<'_>, ctx: &StreamContext) -> Result<Vec<GpsFix>, ExtractError> {
    if record.value_type != b'l' || record.struct_size != 20 {
        return Err(corrupt(format!(
            "GPS5 with unexpected layout: type {:?} size {}",
            record.value_type as char, record.struct_size
        )));
    }
    let raw = record.as_numbers()?;
    Ok(raw
        .chunks(5)
        .map(|v| GpsFix {
            latitude: v[0] / ctx.scale_for(0),
            longitude: v[1] / ctx.scale_for(1),
            altitude: v[2] / ctx.scale_for(2),
            speed_2d: v[3] / ctx.scale_for(3),
            fix: ctx.fix,
            dop: ctx.dop,
            utc: None,
        })
        .collect())
}

fn decode_gps9(record: &Klv<'_>, ctx: &StreamContext) -> Result<Vec<GpsFix>, ExtractError> {
    let layout: Vec<u8> = match (&ctx.type_desc, record.value_type) {
        (Some(desc), b'?') => desc.clone(),
        (None, b'?') => b"lllllllSS".to_vec(),
        (_, other) => return Err(corrupt(format!("GPS9 with unexpected type {:?}", other as char))),
    };
    if layout.len() < 9 {
        return Err(corrupt(format!("GPS9 layout too short: {:?}", String::from_utf8_lossy(&layout))));
    }
    let mut width = 0;
    for t in &layout {
        width += type_width(*t).ok_or_else(|| corrupt(format!("GPS9 layout has unsupported type {:?}", *t as char)))?;
    }
    if width != record.struct_size as usize {
        return Err(corrupt(format!(
            "GPS9 layout is {} bytes but records are {}",
            width, record.struct_size
        )));
    }

    let mut cursor = Cursor::new(record.data);
    let mut fixes = Vec::with_capacity(record.repeat as usize);
    for _ in 0..record.repeat {
        let mut v = Vec::with_capacity(layout.len());
        for (i, t) in layout.iter().enumerate() {
            v.push(read_number(&mut cursor, *t)? / ctx.scale_for(i));
        }
        fixes.push(GpsFix {
            latitude: v[0],
            longitude: v[1],
            altitude: v[2],
            speed_2d: v[3],
            fix: Some(v[8] as u8),
            dop: Some(v[7]),
            utc: gps9_time(v[5], v[6]),
        });
    }
    Ok(fixes)
}

/// GPSU is `yymmddhhmmss.sss`.
pub fn parse_gpsu(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%y%m%d%H%M%S%.f").ok()
}

fn gps9_time(days_since_2000: f64, seconds_since_midnight: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let millis = (seconds_since_midnight * 1000.0).round() as i64;
    epoch
        .checked_add_signed(ChronoDuration::days(days_since_2000 as i64))?
        .checked_add_signed(ChronoDuration::milliseconds(millis))
}
