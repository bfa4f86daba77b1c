use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{KikitoriError, Result};
use super::EncodeRequest;

/// Abstract media processing command representation
#[derive(Debug, Clone, PartialEq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Set audio bitrate
    pub fn audio_bitrate<S: Into<String>>(self, bitrate: S) -> Self {
        self.arg("-b:a").arg(bitrate)
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Set audio sample rate
    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    /// Execute the command, waiting for the process to exit
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media command: {} {:?}", self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| KikitoriError::Encode(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KikitoriError::Encode(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Builder for the encoder invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    /// Create a new command builder
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Build re-encode command: `-y -i <in> [-vn] -b:a <rate> -ac <n> -ar <hz> <out>`
    pub fn transcode_audio(&self, request: &EncodeRequest) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, format!("Re-encode at {}", request.bitrate))
            .overwrite()
            .input(&request.input);

        if request.strip_video {
            cmd = cmd.no_video();
        }

        cmd.audio_bitrate(request.bitrate.clone())
            .audio_channels(request.channels)
            .audio_sample_rate(request.sample_rate)
            .output(&request.output)
    }

    /// Build version check command
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(strip_video: bool) -> EncodeRequest {
        EncodeRequest {
            input: PathBuf::from("in/talk.mp4"),
            output: PathBuf::from("out/talk_processed.mp3"),
            bitrate: "32k".to_string(),
            channels: 1,
            sample_rate: 16000,
            strip_video,
        }
    }

    #[test]
    fn test_transcode_video_source_strips_video() {
        let cmd = MediaCommandBuilder::new("ffmpeg").transcode_audio(&request(true));
        assert_eq!(cmd.binary_path, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec![
                "-y", "-i", "in/talk.mp4", "-vn", "-b:a", "32k", "-ac", "1", "-ar", "16000",
                "out/talk_processed.mp3"
            ]
        );
    }

    #[test]
    fn test_transcode_audio_source_keeps_streams() {
        let cmd = MediaCommandBuilder::new("/opt/ffmpeg").transcode_audio(&request(false));
        assert!(!cmd.args.contains(&"-vn".to_string()));
        assert_eq!(cmd.args[0..3], ["-y", "-i", "in/talk.mp4"]);
    }

    #[test]
    fn test_version_check_uses_configured_binary() {
        let cmd = MediaCommandBuilder::new("/opt/ffmpeg").version_check();
        assert_eq!(cmd.binary_path, "/opt/ffmpeg");
        assert_eq!(cmd.args, vec!["-version"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_encode_error() {
        let cmd = MediaCommand::new("kikitori-no-such-encoder", "Probe").arg("-version");
        let err = cmd.execute().await.unwrap_err();
        assert!(matches!(err, KikitoriError::Encode(msg) if msg.contains("kikitori-no-such-encoder")));
    }
}
