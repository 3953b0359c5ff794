use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use failure::Error;
use serde::{Deserialize, Serialize};

use crate::track::Interpolation;

pub const CONFIG_FILE_NAME: &str = ".gps-extract.toml";

const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_FFPROBE: &str = "ffprobe";
const DEFAULT_MAKE: &str = "GoPro";

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    tools: ToolsConfig,
    #[serde(default)]
    lookup: LookupConfig,
    #[serde(default)]
    annotation: AnnotationConfig,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Default, Clone)]
pub struct ToolsConfig {
    pub ffmpeg: Option<String>,
    pub ffprobe: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Default, Clone)]
pub struct LookupConfig {
    pub interpolation: Option<Interpolation>,
    pub allow_no_fix: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq, Default, Clone)]
pub struct AnnotationConfig {
    pub make: Option<String>,
}

/// Where we look for a config file when none was given on the command line.
pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let mut fh = File::open(path)?;
        let mut contents = String::new();
        fh.read_to_string(&mut contents)?;

        Config::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(body: &str) -> Result<Config, Error> {
        match toml::from_str(body) {
            Ok(config) => Ok(config),
            Err(e) => Err(format_err!("Couldn't parse config: {}", e)),
        }
    }

    /// Load the config the user asked for, or the one in their home directory if it exists, or
    /// fall back to defaults. Only an explicitly requested file is allowed to be missing loudly.
    pub fn load(explicit: Option<&str>) -> Result<Config, Error> {
        if let Some(path) = explicit {
            info!("Loading config from {}", path);
            return Config::from_file(path);
        }
        match default_path() {
            Some(ref path) if path.is_file() => {
                info!("Loading config from {:?}", path);
                Config::from_file(path)
            }
            _ => {
                debug!("No config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn ffmpeg(&self) -> &str {
        self.tools.ffmpeg.as_ref().map(|s| &s[..]).unwrap_or(DEFAULT_FFMPEG)
    }

    pub fn ffprobe(&self) -> &str {
        self.tools.ffprobe.as_ref().map(|s| &s[..]).unwrap_or(DEFAULT_FFPROBE)
    }

    pub fn interpolation(&self) -> Interpolation {
        self.lookup.interpolation.unwrap_or_default()
    }

    pub fn allow_no_fix(&self) -> bool {
        self.lookup.allow_no_fix.unwrap_or(false)
    }

    pub fn make(&self) -> &str {
        self.annotation.make.as_ref().map(|s| &s[..]).unwrap_or(DEFAULT_MAKE)
    }
}
