//! FFprobe-based metadata extraction: duration, size, bitrate and audio presence.

use super::path_arg;
use crate::error::AppError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
    #[serde(default)]
    bit_rate: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    #[serde(default)]
    codec_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

/// Source characteristics the bitrate model works from. Immutable once probed.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub size_bytes: u64,
    /// Container bitrate, or `size * 8 / duration` when the container does not report one.
    pub bitrate_bps: f64,
    pub has_audio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec_name: Option<String>,
}

impl VideoMetadata {
    pub fn size_megabytes(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0
    }

    /// Rejects values no real source has: a non-positive or non-finite duration, or a
    /// negative or non-finite bitrate.
    pub fn check_usable(&self) -> Result<(), AppError> {
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(AppError::probe_failure(format!(
                "duration is missing or zero (got {})",
                self.duration_seconds
            )));
        }
        if !self.bitrate_bps.is_finite() || self.bitrate_bps < 0.0 {
            return Err(AppError::probe_failure(format!(
                "bitrate is not a usable number (got {})",
                self.bitrate_bps
            )));
        }
        Ok(())
    }
}

/// Yields `None` for missing values and ffprobe's `"N/A"` placeholder.
fn parse_number(s: Option<&str>) -> Option<f64> {
    s.map(str::trim)
        .filter(|s| !s.is_empty() && *s != "N/A")
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse ffprobe JSON output into VideoMetadata. A missing or zero duration is a probe failure.
pub fn parse_ffprobe_json(json: &str) -> Result<VideoMetadata, AppError> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| AppError::probe_failure(format!("Failed to parse ffprobe JSON: {}", e)))?;

    let format = output
        .format
        .as_ref()
        .ok_or_else(|| AppError::probe_failure("ffprobe reported no format section"))?;
    let duration = parse_number(format.duration.as_deref()).unwrap_or(0.0);
    if duration <= 0.0 {
        return Err(AppError::probe_failure("duration is missing or zero"));
    }
    let size = parse_number(format.size.as_deref()).unwrap_or(0.0);
    let bitrate = parse_number(format.bit_rate.as_deref()).unwrap_or(size * 8.0 / duration);

    let streams = output.streams.as_deref().unwrap_or_default();
    let has_audio = streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let video_codec_name = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| s.codec_name.clone());

    Ok(VideoMetadata {
        duration_seconds: duration,
        size_bytes: size as u64,
        bitrate_bps: bitrate,
        has_audio,
        format_name: format.format_name.clone(),
        video_codec_name,
    })
}

/// Reads source metadata for a media file.
pub trait MetadataProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoMetadata, AppError>;
}

/// Probe backed by an `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    ffprobe: PathBuf,
}

impl FfprobeProbe {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl MetadataProbe for FfprobeProbe {
    fn probe(&self, path: &Path) -> Result<VideoMetadata, AppError> {
        let path_str = path_arg(path);

        log::debug!(
            target: "fitvid::ffmpeg::ffprobe",
            "probe: ffprobe={}, path={}",
            self.ffprobe.display(),
            path_str
        );

        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration,size,bit_rate,format_name:stream=codec_type,codec_name",
            "-of",
            "json",
            &path_str,
        ]);
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let output = cmd
            .output()
            .map_err(|e| AppError::probe_failure(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::probe_failure(format!(
                "ffprobe failed: {}",
                stderr.trim()
            )));
        }

        let json = String::from_utf8(output.stdout)
            .map_err(|_| AppError::probe_failure("ffprobe output was not valid UTF-8"))?;

        parse_ffprobe_json(&json)
    }
}
