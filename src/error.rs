//! App error type for compression requests. Implements Display and Serialize for the sidecar.

use crate::ffmpeg::parse_ffmpeg_error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    FfmpegNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failure inside this process rather than in the request or the source file.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Could not read video metadata: {0}")]
    ProbeFailure(String),

    #[error("Invalid start/end time: start={start:.3}s, end={end:.3}s")]
    InvalidRange { start: f64, end: f64 },

    #[error("Encoding pass {pass} failed (code {code}): {tail}")]
    EncodeFailure { pass: u8, code: i32, tail: String },
}

impl AppError {
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    pub fn probe_failure(reason: impl Into<String>) -> Self {
        Self::ProbeFailure(reason.into())
    }

    pub fn encode_failure(pass: u8, code: i32, tail: impl Into<String>) -> Self {
        Self::EncodeFailure {
            pass,
            code,
            tail: tail.into(),
        }
    }

    /// Short text for UIs; the full message is kept as detail.
    pub fn summary(&self) -> String {
        match self {
            AppError::EncodeFailure { code, tail, .. } => {
                parse_ffmpeg_error(tail, Some(*code)).summary
            }
            AppError::ProbeFailure(_) => "Could not read video metadata.".to_string(),
            AppError::InvalidRange { .. } => "Invalid start/end time.".to_string(),
            AppError::Internal(_) => "Something went wrong.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let detail = match self {
            AppError::EncodeFailure { code, tail, .. } => {
                parse_ffmpeg_error(tail, Some(*code)).detail
            }
            _ => self.to_string(),
        };
        let json = serde_json::json!({ "summary": self.summary(), "detail": detail });
        serializer.serialize_str(&json.to_string())
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::InvalidRequest(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
