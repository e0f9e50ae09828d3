//! Compressor configuration. Passed explicitly to [`crate::compress::Compressor::new`].

use std::env;
use std::path::PathBuf;

use crate::ffmpeg::DEFAULT_TAIL_LINES;

pub const OUTPUT_DIR_ENV: &str = "FITVID_OUTPUT_DIR";
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";
pub const FFPROBE_PATH_ENV: &str = "FFPROBE_PATH";
pub const DIAGNOSTIC_LINES_ENV: &str = "FITVID_DIAGNOSTIC_LINES";

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorConfig {
    /// Directory receiving `<base>_compressed.mp4` and the pass logs.
    pub output_dir: PathBuf,
    /// Explicit encoder binary; discovered when `None`.
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit probe binary; looked up next to ffmpeg when `None`.
    pub ffprobe_path: Option<PathBuf>,
    /// Encoder stderr lines kept for failure reports.
    pub diagnostic_tail_lines: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            ffmpeg_path: None,
            ffprobe_path: None,
            diagnostic_tail_lines: DEFAULT_TAIL_LINES,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CompressorConfig {
    /// Defaults overridden by environment variables. Unparseable values fall back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = non_empty_var(OUTPUT_DIR_ENV) {
            config.output_dir = PathBuf::from(dir);
        }
        config.ffmpeg_path = non_empty_var(FFMPEG_PATH_ENV).map(PathBuf::from);
        config.ffprobe_path = non_empty_var(FFPROBE_PATH_ENV).map(PathBuf::from);
        if let Some(raw) = non_empty_var(DIAGNOSTIC_LINES_ENV) {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.diagnostic_tail_lines = n,
                _ => log::warn!(
                    target: "fitvid::config",
                    "Ignoring {}={:?}: expected a positive integer",
                    DIAGNOSTIC_LINES_ENV,
                    raw
                ),
            }
        }
        log::debug!(target: "fitvid::config", "Loaded config: {:?}", config);
        config
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}
