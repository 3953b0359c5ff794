use std::time::Duration;

use regex::Regex;

use crate::error::ExtractError;

lazy_static! {
    static ref TIMESTAMP: Regex = Regex::new(
        r"^(?:(?:(?P<hours>\d+):)?(?P<minutes>\d+):)?(?P<seconds>\d+)(?:\.(?P<fraction>\d{1,9}))?$"
    )
    .expect("Failed to compile regex");
}

/// Parse an offset into a video. Accepts `HH:MM:SS`, `MM:SS` or bare seconds, any of which may
/// carry a fractional part of up to nanosecond precision. Fields after the leading one must be
/// below 60.
pub fn parse_timestamp(input: &str) -> Result<Duration, ExtractError> {
    let invalid = || ExtractError::InvalidTimestamp(input.to_string());
    let caps = TIMESTAMP.captures(input.trim()).ok_or_else(invalid)?;

    let field = |name: &str| -> Result<Option<u64>, ExtractError> {
        match caps.name(name) {
            Some(m) => m.as_str().parse::<u64>().map(Some).map_err(|_| invalid()),
            None => Ok(None),
        }
    };

    let hours = field("hours")?;
    let minutes = field("minutes")?;
    let seconds = field("seconds")?.ok_or_else(invalid)?;

    if minutes.is_some() && seconds >= 60 {
        return Err(invalid());
    }
    if let (Some(_), Some(minutes)) = (hours, minutes) {
        if minutes >= 60 {
            return Err(invalid());
        }
    }

    let whole = hours
        .unwrap_or(0)
        .checked_mul(3600)
        .and_then(|h| minutes.unwrap_or(0).checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or_else(invalid)?;

    let nanos = match caps.name("fraction") {
        Some(m) => {
            let digits = m.as_str();
            let value = digits.parse::<u32>().map_err(|_| invalid())?;
            value * 10u32.pow(9 - digits.len() as u32)
        }
        None => 0,
    };

    Ok(Duration::new(whole, nanos))
}
