use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::compress::{CompressOutcome, CompressionRequest, Compressor, SpeedPreference};
use crate::error::AppError;
use crate::ffmpeg::ffprobe::VideoMetadata;
use crate::ffmpeg::{
    EncodePass, FfmpegProgressPayload, format_args_for_display_multiline, path_to_string,
};
use crate::plan::{EncodePlan, PlanDecision, TrimPlan};

pub type SidecarProgressEmitter = Arc<dyn Fn(FfmpegProgressPayload) + Send + Sync>;

/// Size presets offered by front ends, in megabytes.
pub const TARGET_SIZE_PRESETS: &[(&str, f64)] = &[
    ("8 MB", 8.0),
    ("10 MB", 10.0),
    ("25 MB", 25.0),
    ("50 MB", 50.0),
];

fn block_on_async<T>(future: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            AppError::internal(format!("Failed to initialize async runtime: {}", e))
        })?;
    runtime.block_on(future)
}

/// Parse a size label such as `"25 MB"` (or a bare number of megabytes).
pub fn parse_target_size(label: &str) -> Result<f64, AppError> {
    let trimmed = label.trim();
    if let Some((_, mb)) = TARGET_SIZE_PRESETS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
    {
        return Ok(*mb);
    }
    let number = trimmed
        .strip_suffix("MB")
        .or_else(|| trimmed.strip_suffix("mb"))
        .unwrap_or(trimmed)
        .trim();
    number
        .parse::<f64>()
        .ok()
        .filter(|mb| mb.is_finite() && *mb > 0.0)
        .ok_or_else(|| AppError::from(format!("Unrecognized target size: {:?}", label)))
}

/// Wire form of a compression request; the target may be given as a number or a preset label.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressParams {
    pub input_path: PathBuf,
    #[serde(default)]
    pub target_megabytes: Option<f64>,
    #[serde(default)]
    pub target_size: Option<String>,
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

impl CompressParams {
    /// `targetMegabytes` wins when both are present.
    pub fn into_request(self) -> Result<CompressionRequest, AppError> {
        let target_megabytes = match (self.target_megabytes, self.target_size.as_deref()) {
            (Some(mb), _) => mb,
            (None, Some(label)) => parse_target_size(label)?,
            (None, None) => {
                return Err(AppError::from(
                    "either targetMegabytes or targetSize is required",
                ));
            }
        };
        Ok(CompressionRequest {
            input_path: self.input_path,
            target_megabytes,
            remove_audio: self.remove_audio,
            start_seconds: self.start_seconds,
            end_seconds: self.end_seconds,
            use_alternate_codec: self.use_alternate_codec,
            speed_preference: self.speed_preference,
        })
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPreviewResult {
    pub decision: &'static str,
    pub metadata: VideoMetadata,
    pub trim: TrimPlan,
    pub output_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<EncodePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressResult {
    pub output_path: String,
    pub reused: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<EncodePlan>,
}

impl From<CompressOutcome> for CompressResult {
    fn from(outcome: CompressOutcome) -> Self {
        Self {
            output_path: path_to_string(outcome.path()),
            reused: outcome.is_reused(),
            plan: outcome.plan().cloned(),
        }
    }
}

pub fn get_video_metadata(
    compressor: &Compressor,
    path: PathBuf,
) -> Result<VideoMetadata, AppError> {
    compressor.probe(&path)
}

fn display_command(compressor: &Compressor, args: &[String]) -> String {
    format!(
        "{}\n{}",
        path_to_string(compressor.ffmpeg_path()),
        format_args_for_display_multiline(args)
    )
}

/// Probe and plan without encoding.
pub fn preview_plan(
    compressor: &Compressor,
    request: &CompressionRequest,
) -> Result<PlanPreviewResult, AppError> {
    let job = compressor.plan(request)?;
    let (decision, output_path) = match &job.decision {
        PlanDecision::Shortcut(path) => ("shortcut", path_to_string(path)),
        PlanDecision::Planned(_) => ("planned", path_to_string(&job.output_path)),
    };
    let commands = [EncodePass::Analysis, EncodePass::Final]
        .into_iter()
        .map(|pass| {
            job.pass_args(pass)
                .map(|args| display_command(compressor, &args))
        })
        .collect::<Option<Vec<_>>>();
    Ok(PlanPreviewResult {
        decision,
        metadata: job.metadata.clone(),
        trim: job.trim,
        output_path,
        plan: job.encode_plan().cloned(),
        commands,
    })
}

/// Run one compression on a blocking task, relaying progress to `event_emitter` as it arrives.
pub fn compress_with_events(
    compressor: Arc<Compressor>,
    request: CompressionRequest,
    event_emitter: Option<SidecarProgressEmitter>,
) -> Result<CompressResult, AppError> {
    block_on_async(async move {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<FfmpegProgressPayload>();

        let job = tokio::task::spawn_blocking(move || {
            let mut sink = |progress: f64, description: &str| {
                let _ = tx.send(FfmpegProgressPayload {
                    progress,
                    step: Some(description.to_string()),
                });
            };
            compressor.compress(&request, &mut sink)
        });

        while let Some(payload) = rx.recv().await {
            if let Some(emit) = event_emitter.as_ref() {
                emit(payload);
            }
        }

        let outcome = job
            .await
            .map_err(|e| AppError::internal(format!("Compression task failed: {}", e)))??;
        Ok(CompressResult::from(outcome))
    })
}
