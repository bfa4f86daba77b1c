use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KikitoriError, Result};

/// Default configuration file name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "kikitori.toml";

fn default_provider() -> String {
    "groq".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default = "ProviderConfig::groq")]
    pub groq: ProviderConfig,
    #[serde(default = "ProviderConfig::mistral")]
    pub mistral: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for audio/video files
    pub input_dir: PathBuf,
    /// Directory holding re-encoded uploads
    pub optimized_dir: PathBuf,
    /// Directory receiving transcripts and error logs
    pub transcriptions_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Active provider: groq or mistral
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Attempts per file before an error log is written
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff; attempt k waits k times this
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// HTTP timeout for a single upload
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; the provider's environment variable takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    /// Language hint passed to the API, auto-detect when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    pub base_url: String,
}

impl ProviderConfig {
    pub fn groq() -> Self {
        Self {
            api_key: None,
            model: "whisper-large-v3".to_string(),
            language: None,
            temperature: 0.0,
            base_url: "https://api.groq.com/openai/v1".to_string(),
        }
    }

    pub fn mistral() -> Self {
        Self {
            api_key: None,
            model: "voxtral-small-2507".to_string(),
            language: None,
            temperature: 0.0,
            base_url: "https://api.mistral.ai/v1".to_string(),
        }
    }

    fn apply_env<F>(&mut self, prefix: &str, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(&format!("{}_API_KEY", prefix)) {
            self.api_key = Some(key);
        }
        if let Some(model) = lookup(&format!("{}_MODEL", prefix)) {
            self.model = model;
        }
        if let Some(language) = lookup(&format!("{}_LANGUAGE", prefix)) {
            self.language = Some(language);
        }
        if let Some(temperature) = lookup(&format!("{}_TEMPERATURE", prefix)) {
            self.temperature = temperature.trim().parse().map_err(|_| {
                KikitoriError::Config(format!(
                    "{}_TEMPERATURE must be a number, got '{}'",
                    prefix, temperature
                ))
            })?;
        }
        Ok(())
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("to_transcribe"),
            optimized_dir: PathBuf::from("space_optimized_files"),
            transcriptions_dir: PathBuf::from("transcriptions"),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            transcription: TranscriptionConfig::default(),
            media: MediaConfig::default(),
            groq: ProviderConfig::groq(),
            mistral: ProviderConfig::mistral(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KikitoriError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| KikitoriError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KikitoriError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| KikitoriError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Overlay environment variables onto the loaded file.
    ///
    /// `lookup` abstracts `std::env::var` so tests can feed a fixed map.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(provider) = lookup("TRANSCRIPTION_PROVIDER") {
            self.transcription.provider = provider;
        }
        self.groq.apply_env("GROQ", &lookup)?;
        self.mistral.apply_env("MISTRAL", &lookup)?;
        Ok(())
    }

    /// Resolve a configured directory against the base directory
    pub fn resolve_dir(base: &Path, dir: &Path) -> PathBuf {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            base.join(dir)
        }
    }
}
