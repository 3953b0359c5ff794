use std::time::Duration;

/// Format an offset into a video the way ffmpeg and friends print them, with millisecond
/// precision.
/// ```rust
/// # use gopro_gps_extractor::formatting::format_offset;
/// use std::time::Duration;
///
/// assert_eq!(format_offset(Duration::from_millis(3_723_250)), "01:02:03.250".to_string());
/// assert_eq!(format_offset(Duration::from_secs(0)), "00:00:00.000".to_string());
/// ```
pub fn format_offset(offset: Duration) -> String {
    let millis = offset.as_millis();
    let secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        millis % 1000
    )
}

/// Format a given `Duration` as a formatted amount of time a human might reasonably interpret.
/// ```rust
/// # use gopro_gps_extractor::formatting::human_readable_time;
/// use std::time::Duration;
///
/// assert_eq!(human_readable_time(Duration::from_secs(45)), "45s".to_string());
/// assert_eq!(human_readable_time(Duration::from_secs(45311)), "12h35m11s".to_string());
/// ```
pub fn human_readable_time(time: Duration) -> String {
    let mut secs = time.as_secs();
    let mut out = "".to_string();

    if secs >= 60 {
        let mut mins = secs / 60;
        secs %= 60;

        if mins >= 60 {
            let hours = mins / 60;
            mins %= 60;

            out = format!("{}h", hours);
        }
        out = format!("{}{}m", out, mins);
    }
    format!("{}{}s", out, secs)
}

/// Render a signed decimal coordinate pair with hemisphere letters instead of signs.
/// ```rust
/// # use gopro_gps_extractor::formatting::human_readable_coordinate;
/// assert_eq!(human_readable_coordinate(-33.856784, 151.215297),
///            "33.856784°S 151.215297°E".to_string());
/// ```
pub fn human_readable_coordinate(latitude: f64, longitude: f64) -> String {
    let ns = if latitude < 0.0 { 'S' } else { 'N' };
    let ew = if longitude < 0.0 { 'W' } else { 'E' };
    format!("{:.6}°{} {:.6}°{}", latitude.abs(), ns, longitude.abs(), ew)
}

/// Split absolute decimal degrees into whole degrees, whole minutes and seconds rounded to
/// `places` decimal places. Rounding carries into the minutes and degrees, so the seconds always
/// stay below 60.
pub fn degrees_to_dms(decimal: f64, places: u32) -> (u32, u32, f64) {
    let per_second = 10u64.pow(places);
    let per_minute = 60 * per_second;
    let per_degree = 60 * per_minute;
    let total = (decimal.abs() * per_degree as f64).round() as u64;

    let degrees = total / per_degree;
    let minutes = (total % per_degree) / per_minute;
    let seconds = (total % per_minute) as f64 / per_second as f64;
    (degrees as u32, minutes as u32, seconds)
}
