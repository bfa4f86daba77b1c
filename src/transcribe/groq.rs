// Groq Whisper implementation (OpenAI-compatible audio endpoint)

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::common::{TranscriptionResponse, UploadFile, api_error_message, content_type_for, looks_like_html};
use super::{OptimizationSettings, ProviderProfile, TranscriptionProvider};
use crate::config::ProviderConfig;
use crate::error::{KikitoriError, Result};

const HTML_ERROR: &str = "Received HTML error page instead of transcription";
const CONNECTION_ERROR: &str = "Groq API connection error (Cloudflare 520)";

pub fn profile() -> ProviderProfile {
    ProviderProfile {
        name: "groq",
        max_upload_mb: 25,
        supported_extensions: vec![
            ".flac", ".mp3", ".mp4", ".mpeg", ".mpga", ".m4a", ".ogg", ".wav", ".webm",
        ],
        optimization: OptimizationSettings {
            target_extension: ".mp3",
            sample_rate: 16000,
            channels: 1,
            bitrate_ladder: vec!["64k", "32k", "16k", "8k"],
        },
    }
}

pub struct GroqProvider {
    client: Client,
    api_key: String,
    config: ProviderConfig,
    profile: ProviderProfile,
}

impl GroqProvider {
    pub fn new(api_key: String, config: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kikitori/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            config,
            profile: profile(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_form(&self, upload: UploadFile) -> Result<Form> {
        let content_type = content_type_for(&upload.extension);
        let mut form = Form::new()
            .part("file", upload.into_part(content_type)?)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", self.config.temperature.to_string());

        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionProvider for GroqProvider {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn transcribe(&self, file_path: &Path) -> Result<String> {
        let upload = UploadFile::read(file_path).await?;
        debug!("Uploading {} ({} bytes) to Groq model {}", upload.file_name, upload.bytes.len(), self.config.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .multipart(self.build_form(upload)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if looks_like_html(&body) {
                return Err(KikitoriError::Transcription(format!(
                    "Groq API error: {} - {}",
                    status, HTML_ERROR
                )));
            }
            return Err(KikitoriError::Transcription(format!(
                "Groq API error: {} - {}",
                status,
                api_error_message(&body)
            )));
        }

        if looks_like_html(&body) {
            return Err(KikitoriError::Transcription(HTML_ERROR.to_string()));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)?;
        let text = parsed
            .text
            .ok_or_else(|| KikitoriError::Transcription("No transcription text in response".to_string()))?;

        if looks_like_html(&text) {
            return Err(KikitoriError::Transcription(HTML_ERROR.to_string()));
        }

        info!(
            "Groq transcription completed: {} chars, language {}",
            text.len(),
            parsed.language.as_deref().unwrap_or("unknown")
        );
        Ok(text)
    }

    fn reclassify_error(&self, error: KikitoriError) -> KikitoriError {
        let message = error.to_string();
        if message.contains("520") || message.contains("Cloudflare") || message.contains("HTML error page") {
            KikitoriError::Connectivity(CONNECTION_ERROR.to_string())
        } else {
            error
        }
    }
}
