use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::MediaConfig;
use crate::error::Result;
use super::{EncodeRequest, MediaCommandBuilder, MediaEncoder};

/// Concrete encoder implementation (FFmpeg-based)
pub struct FfmpegEncoder {
    command_builder: MediaCommandBuilder,
}

impl FfmpegEncoder {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            command_builder: MediaCommandBuilder::new(config.binary_path),
        }
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn encode(&self, request: &EncodeRequest) -> Result<()> {
        debug!(
            "Encoding {} -> {} at {}",
            request.input.display(),
            request.output.display(),
            request.bitrate
        );

        self.command_builder.transcode_audio(request).execute().await
    }

    async fn check_availability(&self) -> Result<()> {
        self.command_builder.version_check().execute().await?;
        info!("Media encoder is available");
        Ok(())
    }
}
