use crate::error::AppError;
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(target_os = "windows")]
const LOOKUP_COMMAND: &str = "where";
#[cfg(not(target_os = "windows"))]
const LOOKUP_COMMAND: &str = "which";

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let output = Command::new(LOOKUP_COMMAND).arg(binary).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
            PathBuf::from("/opt/local/bin/ffmpeg"),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin\\ffmpeg.exe"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin\\ffmpeg.exe"),
        ]
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/ffmpeg"),
            PathBuf::from("/usr/local/bin/ffmpeg"),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", unix)))]
    {
        vec![]
    }
}

/// Locate FFmpeg: common install paths first to avoid spawning which/where, then PATH.
pub fn find_ffmpeg() -> Result<PathBuf, AppError> {
    for path in common_paths() {
        if path.exists() {
            log::debug!(
                target: "fitvid::ffmpeg::discovery",
                "FFmpeg found in common path: {}",
                path.display()
            );
            return Ok(path);
        }
    }

    if let Some(p) = find_in_path("ffmpeg")
        && p.exists()
    {
        log::debug!(
            target: "fitvid::ffmpeg::discovery",
            "FFmpeg found in PATH: {}",
            p.display()
        );
        return Ok(p);
    }

    log::error!(
        target: "fitvid::ffmpeg::discovery",
        "FFmpeg not found in PATH or common locations"
    );
    Err(AppError::FfmpegNotFound(
        "FFmpeg not found. Please install FFmpeg on your system:\n  - macOS: brew install ffmpeg\n  - Linux: sudo apt install ffmpeg\n  - Windows: Download from https://ffmpeg.org/download.html"
            .to_string(),
    ))
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed first, then plain).
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let Some(parent) = ffmpeg_path.parent() else {
        return vec![];
    };
    let mut candidates = Vec::with_capacity(2);
    if let Some(suffix) = ffmpeg_path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.strip_prefix("ffmpeg"))
        .filter(|suffix| !suffix.is_empty())
    {
        #[cfg(target_os = "windows")]
        candidates.push(parent.join(format!("ffprobe{suffix}.exe")));
        #[cfg(not(target_os = "windows"))]
        candidates.push(parent.join(format!("ffprobe{suffix}")));
    }
    #[cfg(target_os = "windows")]
    candidates.push(parent.join("ffprobe.exe"));
    #[cfg(not(target_os = "windows"))]
    candidates.push(parent.join("ffprobe"));
    candidates
}

/// Locate ffprobe next to the given ffmpeg (they ship together), falling back to PATH.
pub fn find_ffprobe(ffmpeg: &Path) -> Result<PathBuf, AppError> {
    for candidate in ffprobe_candidates(ffmpeg) {
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    if let Some(p) = find_in_path("ffprobe")
        && p.exists()
    {
        log::debug!(
            target: "fitvid::ffmpeg::discovery",
            "ffprobe found in PATH: {}",
            p.display()
        );
        return Ok(p);
    }
    Err(AppError::FfmpegNotFound(format!(
        "ffprobe not found next to {} or in PATH",
        ffmpeg.display()
    )))
}

/// Resolve both binaries, preferring explicit paths when they exist.
pub fn resolve_binaries(
    ffmpeg: Option<&Path>,
    ffprobe: Option<&Path>,
) -> Result<(PathBuf, PathBuf), AppError> {
    let ffmpeg = match ffmpeg {
        Some(p) if p.exists() => p.to_path_buf(),
        Some(p) => {
            log::warn!(
                target: "fitvid::ffmpeg::discovery",
                "Configured FFmpeg path does not exist, searching instead: {}",
                p.display()
            );
            find_ffmpeg()?
        }
        None => find_ffmpeg()?,
    };
    let ffprobe = match ffprobe {
        Some(p) if p.exists() => p.to_path_buf(),
        _ => find_ffprobe(&ffmpeg)?,
    };
    log::info!(
        target: "fitvid::ffmpeg::discovery",
        "Using ffmpeg={}, ffprobe={}",
        ffmpeg.display(),
        ffprobe.display()
    );
    Ok((ffmpeg, ffprobe))
}
