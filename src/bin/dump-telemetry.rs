#[macro_use]
extern crate log;

use std::path::Path;

use clap::{App, Arg};

use gopro_gps_extractor::cli;
use gopro_gps_extractor::config::Config;
use gopro_gps_extractor::extractor::{load_track, sample_json};
use gopro_gps_extractor::formatting::format_offset;
use gopro_gps_extractor::metadata_extractor::FfmpegSource;

fn cli_opts<'a, 'b>() -> App<'a, 'b> {
    cli::base_opts("dump-telemetry")
        .about("Lists every GPS fix recorded in a GoPro video with telemetry")
        .arg(
            Arg::with_name("video-file")
                .short("v")
                .long("video-file")
                .help("Path to the gopro video")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("allow-no-fix")
                .long("allow-no-fix")
                .help("Include samples recorded without a GPS lock"),
        )
        .arg(
            Arg::with_name("format")
                .long("format")
                .takes_value(true)
                .possible_values(&["text", "json"])
                .default_value("text"),
        )
}

fn main() {
    cli::run(|| {
        let matches = cli_opts().get_matches();
        cli::init_logging(matches.value_of("loglevel"));

        let cfg = Config::load(matches.value_of("config"))?;
        let video = Path::new(matches.value_of("video-file").unwrap_or_default());
        let allow_no_fix = matches.is_present("allow-no-fix") || cfg.allow_no_fix();

        let source = FfmpegSource::from_config(&cfg);
        let track = load_track(&source, video, allow_no_fix)?;
        if let Some(device) = track.device_name() {
            info!("Recorded by {}", device);
        }
        if let Some(bounds) = track.bounds() {
            info!("Bounds: {:?}", bounds);
        }

        match matches.value_of("format") {
            Some("json") => {
                let samples: Vec<_> = track.samples().iter().map(sample_json).collect();
                println!("{}", serde_json::to_string_pretty(&samples)?);
            }
            _ => {
                println!("offset\tlatitude\tlongitude\taltitude\tspeed\tfix");
                for s in track.samples() {
                    println!(
                        "{}\t{:.7}\t{:.7}\t{}\t{}\t{}",
                        format_offset(s.offset),
                        s.latitude,
                        s.longitude,
                        s.altitude.map(|a| format!("{:.3}", a)).unwrap_or_else(|| "-".into()),
                        s.speed_2d.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into()),
                        s.fix.map(|f| f.to_string()).unwrap_or_else(|| "-".into()),
                    );
                }
            }
        }
        Ok(())
    })
}
