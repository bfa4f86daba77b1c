// Media re-encoding layer
//
// - Processor: ffmpeg-backed `MediaEncoder`
// - Commands: argument builders for the encoder binary

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::PathBuf;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;

/// Source extensions that carry no video track
pub const AUDIO_ONLY_EXTENSIONS: [&str; 6] = [".mp3", ".mpga", ".m4a", ".ogg", ".wav", ".flac"];

pub fn is_audio_only(extension: &str) -> bool {
    AUDIO_ONLY_EXTENSIONS
        .iter()
        .any(|audio| audio.eq_ignore_ascii_case(extension))
}

/// One re-encode attempt at a fixed bitrate
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub bitrate: String,
    pub channels: u32,
    pub sample_rate: u32,
    /// Drop the video stream; set for sources that may contain one
    pub strip_video: bool,
}

/// Main trait for media encoding operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Run the encoder once; a non-zero exit is an `Encode` error
    async fn encode(&self, request: &EncodeRequest) -> Result<()>;

    /// Check if the encoder binary can be executed
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating encoder instances
pub struct MediaEncoderFactory;

impl MediaEncoderFactory {
    /// Create the default encoder implementation (FFmpeg-based)
    pub fn create_encoder(config: MediaConfig) -> Box<dyn MediaEncoder> {
        Box::new(processor::FfmpegEncoder::new(config))
    }
}
