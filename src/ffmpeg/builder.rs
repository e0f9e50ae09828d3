use std::path::Path;

use super::path_arg;
use super::temp::PassLogFiles;
use crate::compress::SpeedPreference;
use crate::plan::{EncodePlan, TrimPlan};

#[cfg(windows)]
pub const NULL_SINK: &str = "NUL";
#[cfg(not(windows))]
pub const NULL_SINK: &str = "/dev/null";

/// Container written by the final pass.
pub const OUTPUT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCoder {
    H264,
    H265,
}

impl VideoCoder {
    pub fn select(use_alternate_codec: bool) -> Self {
        if use_alternate_codec {
            VideoCoder::H265
        } else {
            VideoCoder::H264
        }
    }

    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            VideoCoder::H264 => "libx264",
            VideoCoder::H265 => "libx265",
        }
    }

    /// QuickTime and Safari only play HEVC in MP4 when tagged hvc1.
    pub fn codec_tag(self) -> Option<&'static str> {
        match self {
            VideoCoder::H264 => None,
            VideoCoder::H265 => Some("hvc1"),
        }
    }
}

/// x264/x265 preset for the speed/quality choice. Bitrates are unaffected.
pub fn encoder_preset(preference: SpeedPreference) -> &'static str {
    match preference {
        SpeedPreference::Speed => "veryfast",
        SpeedPreference::Quality => "slow",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePass {
    /// Statistics only; audio disabled, output discarded.
    Analysis,
    /// Real encode using the analysis statistics.
    Final,
}

impl EncodePass {
    pub fn number(self) -> u8 {
        match self {
            EncodePass::Analysis => 1,
            EncodePass::Final => 2,
        }
    }
}

/// Everything both passes share.
#[derive(Debug, Clone)]
pub struct EncodeSettings<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub trim: &'a TrimPlan,
    pub plan: &'a EncodePlan,
    pub coder: VideoCoder,
    pub preset: &'static str,
    pub pass_logs: &'a PassLogFiles,
}

fn format_seconds(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

fn audio_args(plan: &EncodePlan) -> Vec<String> {
    if plan.audio_enabled && plan.audio_bitrate_bps > 0 {
        vec![
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            plan.audio_bitrate_bps.to_string(),
        ]
    } else {
        vec!["-an".to_string()]
    }
}

/// Escape a value for FFmpeg's `key=value:key=value` option strings, which split on `:`
/// and treat `\` as the escape character.
fn escape_option_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '\'') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn two_pass_args(settings: &EncodeSettings<'_>, pass: EncodePass) -> Vec<String> {
    match settings.coder {
        VideoCoder::H264 => vec![
            "-pass".to_string(),
            pass.number().to_string(),
            "-passlogfile".to_string(),
            path_arg(settings.pass_logs.prefix()),
        ],
        VideoCoder::H265 => vec![
            "-x265-params".to_string(),
            format!(
                "pass={}:stats={}",
                pass.number(),
                escape_option_value(&path_arg(&settings.pass_logs.stats_file()))
            ),
        ],
    }
}

/// Build the argument vector for one pass (program name excluded).
pub fn build_pass_args(settings: &EncodeSettings<'_>, pass: EncodePass) -> Vec<String> {
    let plan = settings.plan;

    log::debug!(
        target: "fitvid::ffmpeg::builder",
        "Building pass {} command: codec={}, preset={}, b:v={}, trim={:?}",
        pass.number(),
        settings.coder.ffmpeg_name(),
        settings.preset,
        plan.video_bitrate_bps,
        settings.trim.is_active.then_some((settings.trim.start, settings.trim.end))
    );

    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(settings.input),
    ];

    if settings.trim.is_active {
        args.extend([
            "-ss".to_string(),
            format_seconds(settings.trim.start),
            "-to".to_string(),
            format_seconds(settings.trim.end),
        ]);
    }

    args.extend([
        "-c:v".to_string(),
        settings.coder.ffmpeg_name().to_string(),
        "-preset".to_string(),
        settings.preset.to_string(),
        "-b:v".to_string(),
        plan.video_bitrate_bps.to_string(),
        "-maxrate".to_string(),
        plan.max_rate_bps.to_string(),
        "-bufsize".to_string(),
        plan.buffer_size_bits.to_string(),
    ]);
    if let Some(tag) = settings.coder.codec_tag() {
        args.extend(["-tag:v".to_string(), tag.to_string()]);
    }
    args.extend(two_pass_args(settings, pass));

    match pass {
        EncodePass::Analysis => {
            args.extend([
                "-an".to_string(),
                "-f".to_string(),
                OUTPUT_EXTENSION.to_string(),
                NULL_SINK.to_string(),
            ]);
        }
        EncodePass::Final => {
            args.extend(audio_args(plan));
            args.extend([
                "-movflags".to_string(),
                "+faststart".to_string(),
                path_arg(settings.output),
            ]);
        }
    }
    args
}

/// Flags this crate emits that never take a value.
const VALUELESS_FLAGS: &[&str] = &["-an", "-y", "-nostdin", "-hide_banner"];

/// Formats args for readable display: option and value on the same line when the next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let takes_value = arg.starts_with('-')
            && !VALUELESS_FLAGS.contains(&arg.as_str())
            && args
                .get(i + 1)
                .is_some_and(|next| !next.starts_with('-') || next.parse::<f64>().is_ok());
        if takes_value {
            lines.push(format!("  {} {}", arg, args[i + 1]));
            i += 2;
        } else {
            lines.push(format!("  {}", arg));
            i += 1;
        }
    }
    lines.join("\n")
}
