//! FFmpeg process spawning and progress parsing for one encode pass.
//!
//! Spawns FFmpeg as a child process and reads its stderr on the calling thread.
//! Status lines are rewritten with `\r`, so both `\r` and `\n` end a line.
//! Progress callbacks run inline with the read loop; they must not block.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use super::progress::{ElapsedTimeParser, pass_fraction};
use crate::error::AppError;

/// Default number of stderr lines kept for error reports.
pub const DEFAULT_TAIL_LINES: usize = 50;

/// Keeps only the most recent `capacity` lines.
#[derive(Debug)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }

    fn preview(&self, n: usize) -> String {
        self.lines
            .iter()
            .rev()
            .take(n)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Calls `on_line` for every non-empty `\r`- or `\n`-terminated segment.
fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(&str)) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line_buf: Vec<u8> = Vec::with_capacity(256);
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        let (complete, used) = match available.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) => {
                line_buf.extend_from_slice(&available[..i]);
                (true, i + 1)
            }
            None => {
                line_buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if complete && !line_buf.is_empty() {
            on_line(&String::from_utf8_lossy(&line_buf));
            line_buf.clear();
        }
    }
    if !line_buf.is_empty() {
        on_line(&String::from_utf8_lossy(&line_buf));
    }
    Ok(())
}

/// Runs encoder passes against one FFmpeg binary.
pub struct PassRunner<'a> {
    ffmpeg: &'a Path,
    parser: &'a dyn ElapsedTimeParser,
    tail_lines: usize,
}

impl<'a> PassRunner<'a> {
    pub fn new(ffmpeg: &'a Path, parser: &'a dyn ElapsedTimeParser, tail_lines: usize) -> Self {
        Self {
            ffmpeg,
            parser,
            tail_lines,
        }
    }

    /// Run one pass to completion. `on_fraction` receives this pass's progress in [0,1],
    /// once per status line carrying a timestamp.
    pub fn run(
        &self,
        pass: u8,
        args: &[String],
        pass_duration: f64,
        on_fraction: &mut dyn FnMut(f64),
    ) -> Result<(), AppError> {
        let output_arg = args.last();
        log::debug!(
            target: "fitvid::ffmpeg::runner",
            "Spawning FFmpeg pass {}: path={}, output={:?}",
            pass,
            self.ffmpeg.display(),
            output_arg
        );

        let mut cmd = Command::new(self.ffmpeg);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(windows)]
        cmd.creation_flags(0x08000000); // CREATE_NO_WINDOW
        let mut child = cmd.spawn().map_err(|e| {
            AppError::encode_failure(pass, -1, format!("Failed to spawn FFmpeg: {}", e))
        })?;

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(AppError::encode_failure(
                pass,
                -1,
                "Failed to capture stderr",
            ));
        };

        let mut tail = DiagnosticTail::new(self.tail_lines);
        let read_result = for_each_line(stderr, |line| {
            tail.push(line);
            if let Some(fraction) = self
                .parser
                .elapsed_seconds(line)
                .and_then(|elapsed| pass_fraction(elapsed, pass_duration))
            {
                on_fraction(fraction);
            }
        });
        if let Err(e) = read_result {
            log::warn!(
                target: "fitvid::ffmpeg::runner",
                "Reading FFmpeg stderr failed (pass {}): {}",
                pass,
                e
            );
        }

        let status = child
            .wait()
            .map_err(|e| AppError::encode_failure(pass, -1, e.to_string()))?;

        if status.success() {
            log::info!(
                target: "fitvid::ffmpeg::runner",
                "FFmpeg pass {} completed successfully",
                pass
            );
            Ok(())
        } else {
            let code = status.code().unwrap_or(-1);
            log::error!(
                target: "fitvid::ffmpeg::runner",
                "FFmpeg pass {} failed (code={}): {}",
                pass,
                code,
                tail.preview(3)
            );
            Err(AppError::encode_failure(pass, code, tail.joined()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_lines(input: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        for_each_line(input, |l| out.push(l.to_string())).unwrap();
        out
    }

    #[test]
    fn splits_on_carriage_return_and_newline() {
        let lines = collect_lines(b"Input #0\nframe=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r\nend");
        assert_eq!(
            lines,
            vec![
                "Input #0",
                "frame=1 time=00:00:01.00",
                "frame=2 time=00:00:02.00",
                "end"
            ]
        );
    }

    #[test]
    fn tail_keeps_most_recent_lines() {
        let mut tail = DiagnosticTail::new(3);
        for i in 0..10 {
            tail.push(&format!("line {}", i));
        }
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.joined(), "line 7\nline 8\nline 9");
        assert_eq!(tail.preview(2), "line 9; line 8");
    }

    #[test]
    fn tail_capacity_is_at_least_one() {
        let mut tail = DiagnosticTail::new(0);
        tail.push("a");
        tail.push("b");
        assert_eq!(tail.joined(), "b");
    }

    #[test]
    fn missing_binary_is_spawn_failure() {
        let parser = crate::ffmpeg::progress::StatusLineParser;
        let runner = PassRunner::new(
            Path::new("/nonexistent/fitvid-ffmpeg"),
            &parser,
            DEFAULT_TAIL_LINES,
        );
        let err = runner
            .run(1, &["-version".to_string()], 1.0, &mut |_| {})
            .unwrap_err();
        match err {
            AppError::EncodeFailure { pass, code, tail } => {
                assert_eq!(pass, 1);
                assert_eq!(code, -1);
                assert!(tail.contains("Failed to spawn FFmpeg"));
            }
            other => panic!("expected EncodeFailure, got {:?}", other),
        }
    }
}
