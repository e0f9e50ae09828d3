pub mod compress;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod plan;
pub mod sidecar_api;

pub use compress::{CompressOutcome, CompressionRequest, Compressor, SpeedPreference};
pub use config::CompressorConfig;
