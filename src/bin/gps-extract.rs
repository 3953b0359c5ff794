#[macro_use]
extern crate log;

use std::path::PathBuf;

use clap::{App, Arg};

use gopro_gps_extractor::cli;
use gopro_gps_extractor::config::Config;
use gopro_gps_extractor::extractor::{self, Request};
use gopro_gps_extractor::metadata_extractor::FfmpegSource;
use gopro_gps_extractor::timestamp::parse_timestamp;

fn cli_opts<'a, 'b>() -> App<'a, 'b> {
    cli::base_opts("gps-extract")
        .about("Extract the GPS data from a GoPro video at a timestamp, and optionally write it to an image file")
        .arg(
            Arg::with_name("video-file")
                .short("v")
                .long("video-file")
                .takes_value(true)
                .required(true)
                .help("The source video to extract the GPS data from"),
        )
        .arg(
            Arg::with_name("timestamp")
                .short("t")
                .long("timestamp")
                .takes_value(true)
                .required(true)
                .help("Offset into the video (HH:MM:SS[.fff], MM:SS or seconds) to extract the GPS data at"),
        )
        .arg(
            Arg::with_name("image-file")
                .short("i")
                .long("image-file")
                .takes_value(true)
                .help("The target image to write the GPS data to"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Write the annotated image here instead of modifying it in place"),
        )
        .arg(
            Arg::with_name("extract-frame")
                .short("e")
                .long("extract-frame")
                .conflicts_with("image-file")
                .help("Extract a still from the video at the timestamp and write the GPS data to it"),
        )
        .arg(
            Arg::with_name("interpolate")
                .long("interpolate")
                .takes_value(true)
                .possible_values(&["nearest", "linear"])
                .help("How to pick a fix between two recorded samples [default: nearest]"),
        )
        .arg(
            Arg::with_name("allow-no-fix")
                .long("allow-no-fix")
                .help("Use samples the camera recorded without a GPS lock"),
        )
        .arg(
            Arg::with_name("format")
                .long("format")
                .takes_value(true)
                .possible_values(&["text", "json"])
                .default_value("text")
                .help("How to print the result"),
        )
}

fn main() {
    cli::run(|| {
        let matches = cli_opts().get_matches();
        cli::init_logging(matches.value_of("loglevel"));

        let cfg = Config::load(matches.value_of("config"))?;
        let timestamp = parse_timestamp(matches.value_of("timestamp").unwrap_or_default())?;

        let mut request = Request::from_config(&cfg, matches.value_of("video-file").unwrap_or_default(), timestamp);
        request.image = matches.value_of("image-file").map(PathBuf::from);
        request.output = matches.value_of("output").map(PathBuf::from);
        request.extract_frame = matches.is_present("extract-frame");
        if let Some(policy) = matches.value_of("interpolate") {
            request.interpolation = policy.parse()?;
        }
        if matches.is_present("allow-no-fix") {
            request.allow_no_fix = true;
        }
        if request.output.is_some() && request.image.is_none() && !request.extract_frame {
            warn!("--output has no effect without --image-file or --extract-frame");
        }

        let source = FfmpegSource::from_config(&cfg);
        let coordinate = extractor::run(&source, &request)?;

        match matches.value_of("format") {
            Some("json") => println!("{}", serde_json::to_string_pretty(&coordinate.to_json())?),
            _ => print!("{}", coordinate.to_plaintext()),
        }
        Ok(())
    })
}
