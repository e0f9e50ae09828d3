use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use fitvid_core::config::CompressorConfig;
use fitvid_core::error::AppError;
use fitvid_core::ffmpeg::FfmpegProgressPayload;
use fitvid_core::sidecar_api::{self, CompressParams};
use fitvid_core::{CompressionRequest, Compressor};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct RpcRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcSuccess {
    id: u64,
    result: Value,
}

#[derive(Debug, serde::Serialize)]
struct RpcFailure {
    id: u64,
    error: RpcErrorPayload,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcErrorPayload {
    summary: String,
    detail: String,
}

#[derive(Debug, serde::Serialize)]
struct RpcEvent {
    event: String,
    payload: Value,
}

#[derive(Debug, Clone, Copy)]
struct ActiveJob {
    job_id: u64,
}

#[derive(Clone)]
struct JobState {
    active_job: Arc<Mutex<Option<ActiveJob>>>,
    next_job_id: Arc<AtomicU64>,
}

impl JobState {
    fn new() -> Self {
        Self {
            active_job: Arc::new(Mutex::new(None)),
            next_job_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn begin_job(&self) -> Result<ActiveJob, AppError> {
        let mut guard = self.active_job.lock();
        if let Some(existing) = *guard {
            return Err(AppError::internal(format!(
                "Another compression is already running (jobId={})",
                existing.job_id
            )));
        }
        let job = ActiveJob {
            job_id: self.next_job_id.fetch_add(1, Ordering::Relaxed),
        };
        *guard = Some(job);
        Ok(job)
    }

    fn finish_job(&self, job_id: u64) {
        let mut guard = self.active_job.lock();
        if let Some(active) = *guard
            && active.job_id == job_id
        {
            *guard = None;
        }
    }
}

struct ActiveJobGuard {
    state: JobState,
    job_id: u64,
}

impl ActiveJobGuard {
    fn new(state: JobState, job_id: u64) -> Self {
        Self { state, job_id }
    }
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.state.finish_job(self.job_id);
    }
}

/// Resolves the compressor on first use so a missing FFmpeg is reported per request.
#[derive(Clone)]
struct CompressorSlot {
    config: CompressorConfig,
    compressor: Arc<Mutex<Option<Arc<Compressor>>>>,
}

impl CompressorSlot {
    fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            compressor: Arc::new(Mutex::new(None)),
        }
    }

    fn get(&self) -> Result<Arc<Compressor>, AppError> {
        let mut guard = self.compressor.lock();
        if let Some(existing) = guard.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let compressor = Arc::new(Compressor::new(self.config.clone())?);
        *guard = Some(Arc::clone(&compressor));
        Ok(compressor)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaInspectParams {
    input_path: PathBuf,
}

type SharedWriter = Arc<Mutex<io::Stdout>>;

fn write_json_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, value)
        .map_err(|e| io::Error::other(format!("serialize response: {}", e)))?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn write_json_line_shared<T: serde::Serialize>(writer: &SharedWriter, value: &T) -> io::Result<()> {
    let mut guard = writer.lock();
    write_json_line(&mut *guard, value)
}

fn emit_rpc_event(writer: &SharedWriter, event: &str, payload: Value) {
    let message = RpcEvent {
        event: event.to_string(),
        payload,
    };
    if let Err(e) = write_json_line_shared(writer, &message) {
        log::warn!(target: "fitvid::sidecar", "Failed to write {} event: {}", event, e);
    }
}

fn emit_job_progress(writer: &SharedWriter, job: ActiveJob, payload: FfmpegProgressPayload) {
    emit_rpc_event(
        writer,
        "media.job.progress",
        json!({
            "jobId": job.job_id,
            "progress": payload.progress,
            "step": payload.step,
        }),
    );
}

fn emit_job_error(writer: &SharedWriter, job: ActiveJob, error: &RpcErrorPayload) {
    emit_rpc_event(
        writer,
        "media.job.error",
        json!({
            "jobId": job.job_id,
            "summary": error.summary,
            "detail": error.detail,
        }),
    );
}

fn emit_job_complete(writer: &SharedWriter, job: ActiveJob) {
    emit_rpc_event(writer, "media.job.complete", json!({ "jobId": job.job_id }));
}

fn parse_error_payload(err: &AppError) -> RpcErrorPayload {
    match err {
        AppError::EncodeFailure { code, tail, .. } => {
            let parsed = fitvid_core::ffmpeg::parse_ffmpeg_error(tail, Some(*code));
            RpcErrorPayload {
                summary: parsed.summary,
                detail: err.to_string(),
            }
        }
        _ => RpcErrorPayload {
            summary: err.summary(),
            detail: err.to_string(),
        },
    }
}

fn params_from_value<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, AppError> {
    serde_json::from_value(params)
        .map_err(|e| AppError::from(format!("Invalid params payload: {}", e)))
}

fn compress_request_from_params(params: Value) -> Result<CompressionRequest, AppError> {
    params_from_value::<CompressParams>(params)?.into_request()
}

fn to_result_value<T: serde::Serialize>(value: T, what: &str) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::internal(format!("Failed to serialize {}: {}", what, e)))
}

fn dispatch_sync(method: &str, params: Value, slot: &CompressorSlot) -> Result<Value, AppError> {
    match method {
        "media.inspect" => {
            let parsed: MediaInspectParams = params_from_value(params)?;
            let compressor = slot.get()?;
            let result = sidecar_api::get_video_metadata(&compressor, parsed.input_path)?;
            to_result_value(result, "metadata")
        }
        "media.plan" => {
            let request = compress_request_from_params(params)?;
            let compressor = slot.get()?;
            let result = sidecar_api::preview_plan(&compressor, &request)?;
            to_result_value(result, "plan")
        }
        _ => Err(AppError::from(format!("Unknown method: {}", method))),
    }
}

fn write_response(writer: &SharedWriter, id: u64, result: Result<Value, AppError>) {
    let response = match result {
        Ok(result) => serde_json::to_value(RpcSuccess { id, result })
            .map_err(|e| io::Error::other(format!("serialize success: {}", e))),
        Err(err) => serde_json::to_value(RpcFailure {
            id,
            error: parse_error_payload(&err),
        })
        .map_err(|e| io::Error::other(format!("serialize failure: {}", e))),
    };

    let written = match response {
        Ok(value) => write_json_line_shared(writer, &value),
        Err(err) => {
            let failure = RpcFailure {
                id,
                error: RpcErrorPayload {
                    summary: "Serialization error".to_string(),
                    detail: err.to_string(),
                },
            };
            write_json_line_shared(writer, &failure)
        }
    };
    if let Err(e) = written {
        log::warn!(target: "fitvid::sidecar", "Failed to write response {}: {}", id, e);
    }
}

fn handle_async_compress(
    request: RpcRequest,
    writer: &SharedWriter,
    jobs: &JobState,
    slot: &CompressorSlot,
) {
    let prepared = compress_request_from_params(request.params)
        .and_then(|compress_request| Ok((compress_request, slot.get()?)));
    let (compress_request, compressor) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return;
        }
    };

    let active_job = match jobs.begin_job() {
        Ok(job) => job,
        Err(err) => {
            write_response(writer, request.id, Err(err));
            return;
        }
    };
    let _job_guard = ActiveJobGuard::new(jobs.clone(), active_job.job_id);
    log::info!(
        target: "fitvid::sidecar",
        "Job {} started: {}",
        active_job.job_id,
        compress_request.input_path.display()
    );

    let writer_for_events = Arc::clone(writer);
    let progress_emitter: sidecar_api::SidecarProgressEmitter =
        Arc::new(move |payload| emit_job_progress(&writer_for_events, active_job, payload));

    let result = sidecar_api::compress_with_events(
        compressor,
        compress_request,
        Some(progress_emitter),
    )
    .and_then(|result| to_result_value(result, "compress result"))
    .map(|mut value| {
        if let Some(object) = value.as_object_mut() {
            object.insert("jobId".to_string(), json!(active_job.job_id));
        }
        value
    });

    match &result {
        Ok(_) => emit_job_complete(writer, active_job),
        Err(err) => emit_job_error(writer, active_job, &parse_error_payload(err)),
    }
    write_response(writer, request.id, result);
}

fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let stdin = io::stdin();
    let stdout: SharedWriter = Arc::new(Mutex::new(io::stdout()));
    let jobs = JobState::new();
    let slot = CompressorSlot::new(CompressorConfig::from_env());
    let mut async_workers: Vec<thread::JoinHandle<()>> = Vec::new();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid input stream".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let failure = RpcFailure {
                    id: 0,
                    error: RpcErrorPayload {
                        summary: "Invalid request".to_string(),
                        detail: err.to_string(),
                    },
                };
                let _ = write_json_line_shared(&stdout, &failure);
                continue;
            }
        };

        if request.method == "media.compress" {
            let writer = Arc::clone(&stdout);
            let job_state = jobs.clone();
            let slot = slot.clone();
            let worker = thread::spawn(move || {
                handle_async_compress(request, &writer, &job_state, &slot);
            });
            async_workers.push(worker);
        } else {
            let result = dispatch_sync(&request.method, request.params, &slot);
            write_response(&stdout, request.id, result);
        }
    }

    for worker in async_workers {
        let _ = worker.join();
    }
    Ok(())
}
