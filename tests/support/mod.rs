#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use fitvid_core::config::CompressorConfig;
use fitvid_core::error::AppError;
use fitvid_core::ffmpeg::ffprobe::{MetadataProbe, VideoMetadata};
use fitvid_core::plan::BYTES_PER_MEGABYTE;
use fitvid_core::{CompressionRequest, Compressor};

const CALL_SEPARATOR: &str = "--- call ---";

/// Stand-in encoder: records its arguments, touches the stats files, prints
/// status lines with `time=` markers and writes the output on the final pass.
const FAKE_FFMPEG_TEMPLATE: &str = r#"#!/bin/sh
echo "@SEPARATOR@" >> "@CALLS@"
for a in "$@"; do printf '%s\n' "$a" >> "@CALLS@"; done

pass=""
stats=""
prev=""
for a in "$@"; do
  case "$prev" in
    -pass) pass="$a" ;;
    -passlogfile) stats="$a-0.log" ;;
    -x265-params)
      pass="${a#pass=}"
      pass="${pass%%:*}"
      stats="${a#*stats=}"
      ;;
  esac
  prev="$a"
done
out="$a"

echo "ffmpeg version fake Copyright (c) the FFmpeg developers" >&2
echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'input':" >&2
if [ -n "$stats" ]; then
  : > "$stats"
  : > "$stats.mbtree"
fi
printf 'frame=  100 fps=50 q=28.0 size=     256kB time=@T1@ bitrate= 800.0kbits/s speed=2x\r' >&2
printf 'frame=  200 fps=50 q=28.0 size=     512kB time=@T2@ bitrate= 800.0kbits/s speed=2x\r' >&2

if [ "$pass" = "@FAIL_PASS@" ]; then
  if [ "$out" != "/dev/null" ]; then printf 'partial' > "$out"; fi
  echo "@FAIL_MESSAGE@" >&2
  exit @FAIL_CODE@
fi

printf 'frame=  300 fps=50 q=28.0 size=     768kB time=@T3@ bitrate= 800.0kbits/s speed=2x\n' >&2
if [ "$out" != "/dev/null" ]; then printf 'fake mp4 payload' > "$out"; fi
exit 0
"#;

#[derive(Debug, Clone)]
pub struct FakeFailure {
    pub pass: u8,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct FakeEncoder {
    /// Three status-line timestamps, `HH:MM:SS.ff`.
    pub times: [String; 3],
    pub failure: Option<FakeFailure>,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self {
            times: [
                "00:00:15.00".to_string(),
                "00:00:30.00".to_string(),
                "00:01:00.00".to_string(),
            ],
            failure: None,
        }
    }
}

impl FakeEncoder {
    pub fn failing(pass: u8, code: i32, message: &str) -> Self {
        Self {
            failure: Some(FakeFailure {
                pass,
                code,
                message: message.to_string(),
            }),
            ..Self::default()
        }
    }

    fn script(&self, calls: &Path) -> String {
        let (fail_pass, fail_code, fail_message) = match &self.failure {
            Some(f) => (f.pass.to_string(), f.code.to_string(), f.message.clone()),
            None => ("none".to_string(), "0".to_string(), String::new()),
        };
        FAKE_FFMPEG_TEMPLATE
            .replace("@SEPARATOR@", CALL_SEPARATOR)
            .replace("@CALLS@", &calls.to_string_lossy())
            .replace("@T1@", &self.times[0])
            .replace("@T2@", &self.times[1])
            .replace("@T3@", &self.times[2])
            .replace("@FAIL_PASS@", &fail_pass)
            .replace("@FAIL_CODE@", &fail_code)
            .replace("@FAIL_MESSAGE@", &fail_message)
    }
}

/// Metadata probe returning fixed values and counting calls.
pub struct StubProbe {
    metadata: VideoMetadata,
    calls: Arc<AtomicUsize>,
}

impl MetadataProbe for StubProbe {
    fn probe(&self, _path: &Path) -> Result<VideoMetadata, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }
}

pub fn metadata(size_mb: f64, duration: f64, has_audio: bool) -> VideoMetadata {
    let size_bytes = (size_mb * BYTES_PER_MEGABYTE) as u64;
    VideoMetadata {
        duration_seconds: duration,
        size_bytes,
        bitrate_bps: size_bytes as f64 * 8.0 / duration,
        has_audio,
        format_name: Some("mov,mp4,m4a,3gp,3g2,mj2".to_string()),
        video_codec_name: Some("h264".to_string()),
    }
}

pub struct CompressEnv {
    dir: tempfile::TempDir,
    pub compressor: Compressor,
    pub probe_calls: Arc<AtomicUsize>,
}

impl CompressEnv {
    pub fn new(encoder: FakeEncoder, metadata: VideoMetadata) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let calls_log = dir.path().join("calls.log");
        let ffmpeg = dir.path().join("fake-ffmpeg");
        fs::write(&ffmpeg, encoder.script(&calls_log)).expect("write fake ffmpeg");
        make_executable(&ffmpeg);

        let probe_calls = Arc::new(AtomicUsize::new(0));
        let probe = StubProbe {
            metadata,
            calls: Arc::clone(&probe_calls),
        };
        let config = CompressorConfig::default().with_output_dir(dir.path().join("outputs"));
        let compressor =
            Compressor::with_probe(config, &ffmpeg, Box::new(probe)).expect("compressor");
        Self {
            dir,
            compressor,
            probe_calls,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("outputs")
    }

    pub fn request(&self, input_name: &str, target_megabytes: f64) -> CompressionRequest {
        CompressionRequest::new(self.path(input_name), target_megabytes)
    }

    /// Arguments of every encoder invocation, in order.
    pub fn encoder_calls(&self) -> Vec<Vec<String>> {
        let Ok(log) = fs::read_to_string(self.path("calls.log")) else {
            return Vec::new();
        };
        let mut calls = Vec::new();
        for line in log.lines() {
            if line == CALL_SEPARATOR {
                calls.push(Vec::new());
            } else if let Some(current) = calls.last_mut() {
                current.push(line.to_string());
            }
        }
        calls
    }

    /// Files left in the output directory, excluding the final output.
    pub fn pass_log_leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.output_dir())
            .expect("read output dir")
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("ffmpeg2pass_"))
            })
            .collect()
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path).expect("script metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod fake ffmpeg");
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

pub fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let idx = args.iter().position(|a| a == flag)?;
    args.get(idx + 1).map(String::as_str)
}

pub fn assert_progress_well_formed(reports: &[(f64, String)]) {
    assert!(!reports.is_empty(), "no progress reported");
    for (p, d) in reports {
        assert!((0.0..=1.0).contains(p), "progress {} out of range ({})", p, d);
    }
    for pair in reports.windows(2) {
        assert!(
            pair[0].0 <= pair[1].0,
            "progress went backwards: {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
}
