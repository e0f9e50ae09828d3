//! Encode orchestration: probe, trim, plan, two passes, cleanup.
//!
//! One [`Compressor::compress`] call is one synchronous operation. Passes run strictly in
//! order on the calling thread and progress is reported through a [`ProgressSink`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::CompressorConfig;
use crate::error::AppError;
use crate::ffmpeg::discovery::resolve_binaries;
use crate::ffmpeg::ffprobe::{FfprobeProbe, MetadataProbe, VideoMetadata};
use crate::ffmpeg::progress::{
    ElapsedTimeParser, PASS1_WINDOW, PASS2_WINDOW, ProgressMapper, ProgressSink, StatusLineParser,
};
use crate::ffmpeg::{
    EncodePass, EncodeSettings, OUTPUT_EXTENSION, PassLogFiles, PassLogGuard, PassRunner,
    VideoCoder, build_pass_args, encoder_preset, path_to_string, remove_partial_output,
};
use crate::plan::{self, EncodePlan, PlanDecision, TrimPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreference {
    Speed,
    #[default]
    Quality,
}

/// One compression request. Immutable for the duration of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionRequest {
    pub input_path: PathBuf,
    pub target_megabytes: f64,
    #[serde(default)]
    pub remove_audio: bool,
    #[serde(default)]
    pub start_seconds: Option<f64>,
    #[serde(default)]
    pub end_seconds: Option<f64>,
    #[serde(default)]
    pub use_alternate_codec: bool,
    #[serde(default)]
    pub speed_preference: SpeedPreference,
}

impl CompressionRequest {
    pub fn new(input_path: impl Into<PathBuf>, target_megabytes: f64) -> Self {
        Self {
            input_path: input_path.into(),
            target_megabytes,
            remove_audio: false,
            start_seconds: None,
            end_seconds: None,
            use_alternate_codec: false,
            speed_preference: SpeedPreference::default(),
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if !self.target_megabytes.is_finite() || self.target_megabytes <= 0.0 {
            return Err(AppError::InvalidRequest(format!(
                "target size must be a positive number of megabytes, got {}",
                self.target_megabytes
            )));
        }
        plan::check_requested_range(self.start_seconds, self.end_seconds)
    }

    fn base_name(&self) -> Result<String, AppError> {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::InvalidRequest(format!(
                    "input path has no file name: {}",
                    self.input_path.display()
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompressOutcome {
    /// Source already satisfied the request and was returned unchanged.
    Reused { path: PathBuf },
    Encoded { path: PathBuf, plan: EncodePlan },
}

impl CompressOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CompressOutcome::Reused { path } | CompressOutcome::Encoded { path, .. } => path,
        }
    }

    pub fn is_reused(&self) -> bool {
        matches!(self, CompressOutcome::Reused { .. })
    }

    pub fn plan(&self) -> Option<&EncodePlan> {
        match self {
            CompressOutcome::Reused { .. } => None,
            CompressOutcome::Encoded { plan, .. } => Some(plan),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Analyzing,
    Planning,
    Pass1,
    Pass2,
    CleaningUp,
    Done,
}

impl Stage {
    fn description(self) -> &'static str {
        match self {
            Stage::Analyzing => "Analyzing...",
            Stage::Planning => "Planning...",
            Stage::Pass1 => "Encoding pass 1/2...",
            Stage::Pass2 => "Encoding pass 2/2...",
            Stage::CleaningUp => "Cleaning up...",
            Stage::Done => "Done",
        }
    }
}

/// Everything decided before the first encoder process starts.
#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub metadata: VideoMetadata,
    pub trim: TrimPlan,
    pub decision: PlanDecision,
    pub coder: VideoCoder,
    pub preset: &'static str,
    pub pass_logs: PassLogFiles,
}

impl PlannedJob {
    pub fn encode_plan(&self) -> Option<&EncodePlan> {
        match &self.decision {
            PlanDecision::Shortcut(_) => None,
            PlanDecision::Planned(plan) => Some(plan),
        }
    }

    fn settings<'a>(&'a self, plan: &'a EncodePlan) -> EncodeSettings<'a> {
        EncodeSettings {
            input: &self.input_path,
            output: &self.output_path,
            trim: &self.trim,
            plan,
            coder: self.coder,
            preset: self.preset,
            pass_logs: &self.pass_logs,
        }
    }

    /// Encoder arguments for one pass, or `None` when the source is reused.
    pub fn pass_args(&self, pass: EncodePass) -> Option<Vec<String>> {
        let plan = self.encode_plan()?;
        Some(build_pass_args(&self.settings(plan), pass))
    }
}

pub struct Compressor {
    config: CompressorConfig,
    ffmpeg: PathBuf,
    probe: Box<dyn MetadataProbe>,
    parser: Box<dyn ElapsedTimeParser>,
}

impl Compressor {
    /// Resolve the encoder and probe binaries and create the output directory.
    pub fn new(config: CompressorConfig) -> Result<Self, AppError> {
        let (ffmpeg, ffprobe) = resolve_binaries(
            config.ffmpeg_path.as_deref(),
            config.ffprobe_path.as_deref(),
        )?;
        Self::with_probe(config, ffmpeg, Box::new(FfprobeProbe::new(ffprobe)))
    }

    /// Use a specific encoder binary and metadata probe.
    pub fn with_probe(
        config: CompressorConfig,
        ffmpeg: impl Into<PathBuf>,
        probe: Box<dyn MetadataProbe>,
    ) -> Result<Self, AppError> {
        fs::create_dir_all(&config.output_dir)?;
        Ok(Self {
            config,
            ffmpeg: ffmpeg.into(),
            probe,
            parser: Box::new(StatusLineParser),
        })
    }

    pub fn with_parser(mut self, parser: Box<dyn ElapsedTimeParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn probe(&self, path: &Path) -> Result<VideoMetadata, AppError> {
        self.probe.probe(path)
    }

    pub fn output_path_for(&self, base_name: &str) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{}_compressed.{}", base_name, OUTPUT_EXTENSION))
    }

    /// Validate, probe and plan without spawning the encoder.
    pub fn plan(&self, request: &CompressionRequest) -> Result<PlannedJob, AppError> {
        request.validate()?;
        let base_name = request.base_name()?;

        let metadata = self.probe.probe(&request.input_path)?;
        metadata.check_usable()?;
        log::info!(
            target: "fitvid::compress",
            "Probed {}: duration={:.3}s, size={}B, bitrate={:.0}bps, audio={}",
            request.input_path.display(),
            metadata.duration_seconds,
            metadata.size_bytes,
            metadata.bitrate_bps,
            metadata.has_audio
        );

        let trim = plan::resolve_trim(
            request.start_seconds,
            request.end_seconds,
            metadata.duration_seconds,
        )?;
        let decision = plan::decide(request, &metadata, &trim);

        Ok(PlannedJob {
            input_path: request.input_path.clone(),
            output_path: self.output_path_for(&base_name),
            metadata,
            trim,
            decision,
            coder: VideoCoder::select(request.use_alternate_codec),
            preset: encoder_preset(request.speed_preference),
            pass_logs: PassLogFiles::for_input(&self.config.output_dir, &base_name),
        })
    }

    /// Compress `request.input_path` to fit the target size.
    pub fn compress(
        &self,
        request: &CompressionRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<CompressOutcome, AppError> {
        let mut progress = ProgressMapper::new(sink);
        progress.report(0.0, Stage::Analyzing.description());

        let job = self.plan(request)?;
        let plan = match &job.decision {
            PlanDecision::Shortcut(path) => {
                log::info!(
                    target: "fitvid::compress",
                    "Source already under {} MB, reusing {}",
                    request.target_megabytes,
                    path.display()
                );
                progress.report(1.0, Stage::Done.description());
                return Ok(CompressOutcome::Reused { path: path.clone() });
            }
            PlanDecision::Planned(plan) => plan.clone(),
        };
        progress.report(0.0, Stage::Planning.description());

        let settings = job.settings(&plan);
        let pass1_args = build_pass_args(&settings, EncodePass::Analysis);
        let pass2_args = build_pass_args(&settings, EncodePass::Final);

        let guard = PassLogGuard::acquire(job.pass_logs.clone());
        let runner = PassRunner::new(
            &self.ffmpeg,
            self.parser.as_ref(),
            self.config.diagnostic_tail_lines,
        );
        let duration = job.trim.duration();

        log::info!(
            target: "fitvid::compress",
            "Encoding {} -> {} ({}, preset {})",
            job.input_path.display(),
            job.output_path.display(),
            job.coder.ffmpeg_name(),
            job.preset
        );

        progress.report_in_window(PASS1_WINDOW, 0.0, Stage::Pass1.description());
        runner.run(
            EncodePass::Analysis.number(),
            &pass1_args,
            duration,
            &mut |fraction| {
                progress.report_in_window(PASS1_WINDOW, fraction, Stage::Pass1.description())
            },
        )?;

        progress.report_in_window(PASS2_WINDOW, 0.0, Stage::Pass2.description());
        let pass2 = runner.run(
            EncodePass::Final.number(),
            &pass2_args,
            duration,
            &mut |fraction| {
                progress.report_in_window(PASS2_WINDOW, fraction, Stage::Pass2.description())
            },
        );
        if let Err(e) = pass2 {
            remove_partial_output(&job.output_path);
            return Err(e);
        }

        log::debug!(target: "fitvid::compress", "{}", Stage::CleaningUp.description());
        drop(guard);

        progress.report(1.0, Stage::Done.description());
        log::info!(
            target: "fitvid::compress",
            "Compressed to {}",
            path_to_string(&job.output_path)
        );
        Ok(CompressOutcome::Encoded {
            path: job.output_path,
            plan,
        })
    }
}
