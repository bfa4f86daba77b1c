// Mistral Voxtral transcription implementation

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::Form;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::common::{TranscriptionResponse, UploadFile, api_error_message, content_type_for};
use super::{OptimizationSettings, ProviderProfile, TranscriptionProvider};
use crate::config::ProviderConfig;
use crate::error::{KikitoriError, Result};

pub fn profile() -> ProviderProfile {
    ProviderProfile {
        name: "mistral",
        max_upload_mb: 25,
        supported_extensions: vec![".mp3", ".mp4", ".mpeg", ".mpga", ".m4a", ".wav", ".webm"],
        optimization: OptimizationSettings {
            target_extension: ".mp3",
            sample_rate: 16000,
            channels: 1,
            bitrate_ladder: vec!["96k", "64k", "48k", "32k"],
        },
    }
}

pub struct MistralProvider {
    client: Client,
    api_key: String,
    config: ProviderConfig,
    profile: ProviderProfile,
}

impl MistralProvider {
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
            .text("response_format", "json");

        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        // The API default is used unless a temperature was set explicitly
        if self.config.temperature != 0.0 {
            form = form.text("temperature", self.config.temperature.to_string());
        }

        Ok(form)
    }
}

#[async_trait]
impl TranscriptionProvider for MistralProvider {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn transcribe(&self, file_path: &Path) -> Result<String> {
        let upload = UploadFile::read(file_path).await?;
        debug!("Uploading {} ({} bytes) to Mistral model {}", upload.file_name, upload.bytes.len(), self.config.model);

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
            return Err(KikitoriError::Transcription(format!(
                "Mistral API error: {} - {}",
                status.as_u16(),
                api_error_message(&body)
            )));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)?;
        let text = parsed
            .text
            .ok_or_else(|| KikitoriError::Transcription("No transcription text in response".to_string()))?;

        info!("Mistral transcription completed: {} chars", text.len());
        Ok(text)
    }
}
