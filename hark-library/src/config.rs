//! Simple configuration persistence for Hark
//!
//! Stores pipeline sizes and recorder preferences as `key=value` lines.

use hark_audio::CaptureConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::store::FileStore;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Samples per analysis block
    pub block_size: usize,
    /// Spectrum transform size (power of two)
    pub fft_size: usize,
    /// Number of display bars
    pub bar_count: usize,
    /// Start recording as soon as capture starts
    pub record: bool,
    /// Seconds between autosaves while recording (0 disables)
    pub autosave_secs: u64,
    /// Stop after this many seconds (0 runs until told to quit)
    pub duration_secs: u64,
    /// Where the level log is kept
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 1024,
            fft_size: 1024,
            bar_count: 32,
            record: false,
            autosave_secs: 30,
            duration_secs: 0,
            data_dir: None,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be read.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hark")
            .join("config.txt")
    }

    /// Directory for the level log
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(FileStore::default_dir)
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            block_size: self.block_size,
            fft_size: self.fft_size,
        }
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_secs > 0).then(|| Duration::from_secs(self.autosave_secs))
    }

    pub fn run_duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    /// Parse config from simple key=value format
    ///
    /// Unknown keys and unparsable values are ignored.
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "block_size" => set_parsed(&mut config.block_size, value),
                "fft_size" => set_parsed(&mut config.fft_size, value),
                "bar_count" => set_parsed(&mut config.bar_count, value),
                "record" => set_parsed(&mut config.record, value),
                "autosave_secs" => set_parsed(&mut config.autosave_secs, value),
                "duration_secs" => set_parsed(&mut config.duration_secs, value),
                "data_dir" => {
                    if !value.is_empty() {
                        config.data_dir = Some(PathBuf::from(value));
                    }
                }
                _ => {}
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec![
            "# Hark Configuration".to_string(),
            format!("block_size={}", self.block_size),
            format!("fft_size={}", self.fft_size),
            format!("bar_count={}", self.bar_count),
            format!("record={}", self.record),
            format!("autosave_secs={}", self.autosave_secs),
            format!("duration_secs={}", self.duration_secs),
        ];

        if let Some(ref dir) = self.data_dir {
            lines.push(format!("data_dir={}", dir.display()));
        }

        lines.join("\n")
    }
}

fn set_parsed<T: FromStr>(field: &mut T, value: &str) {
    match value.parse() {
        Ok(parsed) => *field = parsed,
        Err(_) => tracing::warn!(value, "ignoring unparsable config value"),
    }
}
