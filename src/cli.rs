use std::env;

use clap::{App, Arg};
use failure::Error;

use crate::error;
use crate::{AUTHOR, VERSION};

/// Create the base set of clap options common to all cli commands
pub fn base_opts<'a, 'b>(name: &str) -> App<'a, 'b> {
    App::new(name)
        .version(VERSION)
        .author(AUTHOR)
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::with_name("loglevel")
                .short("l")
                .long("loglevel")
                .takes_value(true)
                .possible_values(&["DEBUG", "INFO"])
                .case_insensitive(true)
                .default_value("INFO")
                .help("The logging level, RUST_LOG takes precedence"),
        )
}

/// Setup logging. RUST_LOG wins if it is set, otherwise the level asked for on the command line is
/// used, falling back to INFO.
pub fn init_logging(level: Option<&str>) {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", level.unwrap_or("INFO").to_uppercase());
    }
    // Tests and repeated calls would otherwise panic on the second init
    let _ = pretty_env_logger::try_init();
}

/// Run a given closure and deal with any errors. This allows you to have a fairly simple main, eg:
///
/// ```no_run
/// use gopro_gps_extractor::cli::run;
///
/// fn main() {
///     run(|| {
///         // Do stuff here, including using the ? operator with reckless abandon.
///         // ...
///         // You must however return Ok(())
///         Ok(())
///     });
/// }
/// ```
///
/// Errors are reported on stderr whether or not logging came up, and the process exits with a
/// status reflecting the kind of failure.
pub fn run<F: FnOnce() -> Result<(), Error>>(main: F) {
    if let Err(e) = main() {
        eprintln!("error: {}", e);
        for cause in e.iter_causes() {
            eprintln!("  caused by: {}", cause);
        }
        debug!("{:?}", e);
        if env::var("RUST_BACKTRACE").is_ok() {
            error!("{:?}", e.backtrace());
        }
        ::std::process::exit(error::exit_code(&e));
    }
}
