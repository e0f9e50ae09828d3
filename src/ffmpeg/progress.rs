//! Encoder progress: elapsed-time parsing and pass-window rescaling.

use regex::Regex;
use std::sync::LazyLock;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time=(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("invalid time regex")
});

/// Extracts elapsed encode time (seconds) from one line of encoder diagnostics.
pub trait ElapsedTimeParser: Send + Sync {
    fn elapsed_seconds(&self, line: &str) -> Option<f64>;
}

/// Parses the `time=HH:MM:SS.ff` field FFmpeg prints on its status line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusLineParser;

impl ElapsedTimeParser for StatusLineParser {
    fn elapsed_seconds(&self, line: &str) -> Option<f64> {
        // A status line may carry more than one update when \r splitting missed; use the last.
        let caps = TIME_RE.captures_iter(line).last()?;
        let hours: f64 = caps[1].parse().ok()?;
        let minutes: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }
}

/// Fraction of one pass done, capped at 1.0. Zero or negative durations report nothing.
pub fn pass_fraction(elapsed: f64, pass_duration: f64) -> Option<f64> {
    if pass_duration <= 0.0 || !elapsed.is_finite() {
        return None;
    }
    Some((elapsed / pass_duration).clamp(0.0, 1.0))
}

/// Slice `[start, end)` of the overall progress bar owned by one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWindow {
    pub start: f64,
    pub end: f64,
}

impl ProgressWindow {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn map(&self, fraction_in_pass: f64) -> f64 {
        self.start + fraction_in_pass.clamp(0.0, 1.0) * (self.end - self.start)
    }
}

/// Pass 1 fills the first quarter of the bar, pass 2 the rest.
pub const PASS1_WINDOW: ProgressWindow = ProgressWindow::new(0.0, 0.25);
pub const PASS2_WINDOW: ProgressWindow = ProgressWindow::new(0.25, 1.0);

/// Receives `(fraction, description)` updates. Must return promptly.
pub trait ProgressSink {
    fn report(&mut self, fraction: f64, description: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(f64, &str),
{
    fn report(&mut self, fraction: f64, description: &str) {
        self(fraction, description)
    }
}

/// Forwards progress to a sink, never letting the reported value go backwards.
pub struct ProgressMapper<'a> {
    sink: &'a mut dyn ProgressSink,
    last: f64,
}

impl<'a> ProgressMapper<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: 0.0 }
    }

    pub fn report(&mut self, fraction: f64, description: &str) {
        let value = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0).max(self.last)
        } else {
            self.last
        };
        self.last = value;
        self.sink.report(value, description);
    }

    pub fn report_in_window(&mut self, window: ProgressWindow, fraction: f64, description: &str) {
        self.report(window.map(fraction), description);
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}
