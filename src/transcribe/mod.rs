// Provider-based transcription architecture
//
// Every speech-to-text service is reached through the `TranscriptionProvider`
// trait and built by `ProviderFactory`:
// - Groq: OpenAI-compatible Whisper endpoint
// - Mistral: Voxtral transcription endpoint
//
// To add a new service:
// 1. Describe its limits with a `ProviderProfile`
// 2. Implement `TranscriptionProvider` (one HTTP call, no retry)
// 3. Add a variant to `ProviderKind` and wire it in the factory

pub mod common;
pub mod groq;
pub mod mistral;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use common::*;
use crate::config::Config;
use crate::error::{KikitoriError, Result};

/// Re-encoding parameters used when a file does not fit the provider
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationSettings {
    /// Extension of the optimized file, including the leading dot
    pub target_extension: &'static str,
    pub sample_rate: u32,
    pub channels: u32,
    /// Bitrates tried in order, highest quality first
    pub bitrate_ladder: Vec<&'static str>,
}

/// Static capability set of a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub max_upload_mb: u64,
    pub supported_extensions: Vec<&'static str>,
    pub optimization: OptimizationSettings,
}

impl ProviderProfile {
    pub fn supports_extension(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(extension))
    }

    /// Size an optimized file must stay under, leaving headroom for multipart overhead
    pub fn target_size_mb(&self) -> f64 {
        self.max_upload_mb.saturating_sub(5) as f64
    }
}

/// Main trait for transcription services
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Capabilities used for classification and optimization
    fn profile(&self) -> &ProviderProfile;

    /// Upload one file and return its text; a single request, never retried here
    async fn transcribe(&self, file_path: &Path) -> Result<String>;

    /// Map a raw failure to the error that should be reported and retried
    fn reclassify_error(&self, error: KikitoriError) -> KikitoriError {
        error
    }
}

/// Supported transcription services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Mistral,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Groq, ProviderKind::Mistral];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Mistral => "mistral",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::Groq => "GROQ_API_KEY",
            ProviderKind::Mistral => "MISTRAL_API_KEY",
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        match self {
            ProviderKind::Groq => groq::profile(),
            ProviderKind::Mistral => mistral::profile(),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = KikitoriError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "groq" => Ok(ProviderKind::Groq),
            "mistral" => Ok(ProviderKind::Mistral),
            _ => Err(KikitoriError::Config(format!(
                "Unsupported provider '{}'. Supported providers: groq, mistral",
                name
            ))),
        }
    }
}

/// Factory for creating provider instances
pub struct ProviderFactory;

impl ProviderFactory {
    /// Resolve the provider named in the configuration
    pub fn kind_from_config(config: &Config) -> Result<ProviderKind> {
        config.transcription.provider.parse()
    }

    /// Create the configured provider, requiring its API key
    pub fn create(kind: ProviderKind, config: &Config) -> Result<Box<dyn TranscriptionProvider>> {
        let timeout = Duration::from_secs(config.transcription.request_timeout_secs);

        match kind {
            ProviderKind::Groq => {
                let api_key = require_api_key(kind, config.groq.api_key.as_deref())?;
                Ok(Box::new(groq::GroqProvider::new(api_key, config.groq.clone(), timeout)?))
            }
            ProviderKind::Mistral => {
                let api_key = require_api_key(kind, config.mistral.api_key.as_deref())?;
                Ok(Box::new(mistral::MistralProvider::new(api_key, config.mistral.clone(), timeout)?))
            }
        }
    }

    /// Parse the provider name and build it in one step
    pub fn from_config(config: &Config) -> Result<Box<dyn TranscriptionProvider>> {
        let kind = Self::kind_from_config(config)?;
        Self::create(kind, config)
    }
}

fn require_api_key(kind: ProviderKind, key: Option<&str>) -> Result<String> {
    match key.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(KikitoriError::Config(format!(
            "{} not found; set it in the environment or .env file",
            kind.api_key_var()
        ))),
    }
}
