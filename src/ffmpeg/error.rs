//! Map FFmpeg exit codes to user-friendly messages.
//!
//! Exit codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). -1 is used for spawn failure or a signal kill.
//! The diagnostic tail is kept as detail for debugging.

use serde::Serialize;

/// Error payload for the sidecar. Frontend shows summary; detail is expandable.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegErrorPayload {
    pub summary: String,
    pub detail: String,
}

/// Maps FFmpeg exit code to a short summary. The diagnostic tail is passed through as detail.
pub fn parse_ffmpeg_error(tail: &str, exit_code: Option<i32>) -> FfmpegErrorPayload {
    let summary = match exit_code {
        Some(code) => known_exit_code_summary(code)
            .unwrap_or_else(|| format!("FFmpeg failed (exit code {}).", code)),
        None => last_line_truncated(tail, 120),
    };
    FfmpegErrorPayload {
        summary,
        detail: tail.trim().to_string(),
    }
}

fn known_exit_code_summary(code: i32) -> Option<String> {
    match code {
        -1 => Some("FFmpeg not found or failed to start.".into()),
        1 => Some("FFmpeg failed.".into()),
        69 => Some("Encoding rate limit exceeded.".into()),
        123 | 255 => Some("Encoding was stopped.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

/// FFmpeg prints the actual failure last, so the final non-empty line is the useful one.
fn last_line_truncated(tail: &str, max_len: usize) -> String {
    let last = tail
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if last.len() <= max_len {
        return last.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !last.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &last[..cut], ELLIPSIS)
}
