//! Trim resolution and bitrate allocation. Everything here is pure: the same
//! metadata, trim and target always produce the same plan.

use std::path::PathBuf;

use crate::compress::CompressionRequest;
use crate::error::AppError;
use crate::ffmpeg::ffprobe::VideoMetadata;

pub const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;
/// Targets at or below this get the larger safety margin.
pub const SMALL_TARGET_MEGABYTES: f64 = 20.0;
pub const SMALL_TARGET_BUFFER: f64 = 0.90;
pub const LARGE_TARGET_BUFFER: f64 = 0.95;

pub const AUDIO_BITRATE_STANDARD: u32 = 128_000;
pub const AUDIO_BITRATE_REDUCED: u32 = 64_000;
/// Below this video allowance the audio budget is halved.
pub const MIN_USABLE_VIDEO_BPS: f64 = 200_000.0;
pub const MIN_VIDEO_BITRATE_BPS: u64 = 10_000;
/// Applied when the budget would exceed the source bitrate.
pub const SOURCE_BITRATE_FACTOR: f64 = 0.95;

pub const MAX_RATE_FACTOR: f64 = 1.5;
pub const BUFFER_SIZE_FACTOR: f64 = 2.0;

/// Effective time range of the output, in source seconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimPlan {
    pub start: f64,
    pub end: f64,
    pub is_active: bool,
}

impl TrimPlan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Rejects an explicitly inverted or empty range without needing the source duration.
pub fn check_requested_range(start: Option<f64>, end: Option<f64>) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (start, end)
        && end <= start.max(0.0)
    {
        return Err(AppError::InvalidRange { start, end });
    }
    Ok(())
}

/// Clamp the requested range into `[0, duration]`. Missing bounds mean "from the start" / "to the end".
pub fn resolve_trim(
    start: Option<f64>,
    end: Option<f64>,
    duration: f64,
) -> Result<TrimPlan, AppError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(AppError::probe_failure(format!(
            "duration is missing or zero (got {})",
            duration
        )));
    }
    let start = start.unwrap_or(0.0).clamp(0.0, duration);
    let end = end.unwrap_or(duration).clamp(0.0, duration);
    if end - start <= 0.0 || start.is_nan() || end.is_nan() {
        return Err(AppError::InvalidRange { start, end });
    }
    Ok(TrimPlan {
        start,
        end,
        is_active: start > 0.0 || end < duration,
    })
}

/// Bitrates handed to the encoder for one operation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodePlan {
    pub video_bitrate_bps: u64,
    pub audio_bitrate_bps: u32,
    pub audio_enabled: bool,
    pub max_rate_bps: u64,
    pub buffer_size_bits: u64,
    pub target_duration: f64,
    pub buffer_factor: f64,
}

/// Outcome of planning: either the source already satisfies the request or an encode is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    Shortcut(PathBuf),
    Planned(EncodePlan),
}

pub fn target_bytes(target_megabytes: f64) -> f64 {
    target_megabytes * BYTES_PER_MEGABYTE
}

/// Container overhead is a bigger share of a small budget, so small targets reserve more.
pub fn buffer_factor(target_megabytes: f64) -> f64 {
    if target_megabytes <= SMALL_TARGET_MEGABYTES {
        SMALL_TARGET_BUFFER
    } else {
        LARGE_TARGET_BUFFER
    }
}

/// True when the request would produce something different from the source file.
pub fn changes_output(request: &CompressionRequest, trim: &TrimPlan) -> bool {
    trim.is_active || request.remove_audio || request.use_alternate_codec
}

/// Shortcut when the source already fits and nothing about it would change; otherwise allocate.
pub fn decide(
    request: &CompressionRequest,
    metadata: &VideoMetadata,
    trim: &TrimPlan,
) -> PlanDecision {
    let fits = (metadata.size_bytes as f64) < target_bytes(request.target_megabytes);
    if fits && !changes_output(request, trim) {
        return PlanDecision::Shortcut(request.input_path.clone());
    }
    PlanDecision::Planned(allocate_bitrates(
        metadata,
        trim,
        request.target_megabytes,
        request.remove_audio,
    ))
}

/// Split the byte budget for `trim.duration()` seconds between audio and video.
pub fn allocate_bitrates(
    metadata: &VideoMetadata,
    trim: &TrimPlan,
    target_megabytes: f64,
    remove_audio: bool,
) -> EncodePlan {
    let buffer = buffer_factor(target_megabytes);
    let effective_bytes = target_bytes(target_megabytes) * buffer;
    let target_duration = trim.duration();
    let allowed_total_bitrate = effective_bytes * 8.0 / target_duration;

    let audio_enabled = metadata.has_audio && !remove_audio;
    let audio_bitrate = if !audio_enabled {
        0
    } else if allowed_total_bitrate - f64::from(AUDIO_BITRATE_STANDARD) < MIN_USABLE_VIDEO_BPS {
        AUDIO_BITRATE_REDUCED
    } else {
        AUDIO_BITRATE_STANDARD
    };

    let mut video = allowed_total_bitrate - f64::from(audio_bitrate);
    if metadata.bitrate_bps > 0.0 && video > metadata.bitrate_bps {
        log::warn!(
            target: "fitvid::plan",
            "Target bitrate ({:.0}) > source ({:.0}). Clamping.",
            video,
            metadata.bitrate_bps
        );
        video = metadata.bitrate_bps * SOURCE_BITRATE_FACTOR;
    }
    let video_bitrate_bps = (video.max(0.0) as u64).max(MIN_VIDEO_BITRATE_BPS);

    let plan = EncodePlan {
        video_bitrate_bps,
        audio_bitrate_bps: audio_bitrate,
        audio_enabled,
        max_rate_bps: (video_bitrate_bps as f64 * MAX_RATE_FACTOR) as u64,
        buffer_size_bits: (video_bitrate_bps as f64 * BUFFER_SIZE_FACTOR) as u64,
        target_duration,
        buffer_factor: buffer,
    };
    log::debug!(
        target: "fitvid::plan",
        "Planned encode: total={:.0}bps, video={}bps, audio={}bps, duration={:.3}s, buffer={}",
        allowed_total_bitrate,
        plan.video_bitrate_bps,
        plan.audio_bitrate_bps,
        target_duration,
        buffer
    );
    plan
}
