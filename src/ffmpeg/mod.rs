mod builder;
pub mod discovery;
mod error;
pub mod ffprobe;
pub mod progress;
mod runner;
mod temp;

pub use builder::{
    EncodePass, EncodeSettings, NULL_SINK, OUTPUT_EXTENSION, VideoCoder, build_pass_args,
    encoder_preset, format_args_for_display_multiline,
};
pub use error::{FfmpegErrorPayload, parse_ffmpeg_error};
pub use runner::{DEFAULT_TAIL_LINES, DiagnosticTail, PassRunner};
pub use temp::{PassLogFiles, PassLogGuard, remove_partial_output};

/// Progress payload for job progress events.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FfmpegProgressPayload {
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

/// Path to string for FFmpeg args or logging.
pub fn path_to_string(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    path.as_ref().to_string_lossy().to_string()
}

/// Path as a command-line operand. A relative path starting with `-` gets a `./` prefix so
/// FFmpeg does not read it as an option.
pub fn path_arg(path: &(impl AsRef<std::path::Path> + ?Sized)) -> String {
    let text = path_to_string(path);
    if text.starts_with('-') {
        format!("./{}", text)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn dash_leading_paths_are_not_options() {
        assert_eq!(path_arg(Path::new("-clip.mp4")), "./-clip.mp4");
        assert_eq!(path_arg(Path::new("-dir/clip.mp4")), "./-dir/clip.mp4");
        assert_eq!(path_arg(Path::new("clip-1.mp4")), "clip-1.mp4");
        assert_eq!(path_arg(Path::new("/videos/-clip.mp4")), "/videos/-clip.mp4");
    }
}
