use reqwest::multipart::Part;
use serde::Deserialize;
use std::path::Path;

use crate::error::{KikitoriError, Result};

/// Body of a successful transcription response
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionResponse {
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Error envelope shared by OpenAI-compatible APIs
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: Option<ApiErrorDetail>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorDetail {
    Object { message: Option<String> },
    Text(String),
}

/// File name and bytes for a multipart upload
#[derive(Debug)]
pub struct UploadFile {
    pub file_name: String,
    pub extension: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub async fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(KikitoriError::FileNotFound(path.display().to_string()));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| KikitoriError::FileNotFound(path.display().to_string()))?;
        let extension = extension_of(path);
        let bytes = tokio::fs::read(path).await?;

        Ok(Self {
            file_name,
            extension,
            bytes,
        })
    }

    /// Consume into a multipart part with the given content type
    pub fn into_part(self, content_type: &str) -> Result<Part> {
        Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(content_type)
            .map_err(KikitoriError::Http)
    }
}

/// Lower-cased extension with a leading dot, empty when missing
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Content type sent with an upload
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        ".mp3" | ".mpga" => "audio/mpeg",
        ".mp4" => "video/mp4",
        ".mpeg" => "video/mpeg",
        ".m4a" => "audio/mp4",
        ".wav" => "audio/wav",
        ".webm" => "audio/webm",
        ".ogg" => "audio/ogg",
        ".flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}

/// Whether a body is an HTML page (proxies answer with these on upstream failure)
pub fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    let prefix: String = head.chars().take(15).collect::<String>().to_lowercase();
    prefix.starts_with("<!doctype html") || prefix.starts_with("<html")
}

/// Extract the human-readable message from an error body, falling back to the raw text
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(ApiErrorResponse {
            error: Some(ApiErrorDetail::Object { message: Some(message) }),
            ..
        }) => message,
        Ok(ApiErrorResponse {
            error: Some(ApiErrorDetail::Text(message)),
            ..
        }) => message,
        Ok(ApiErrorResponse {
            message: Some(message),
            ..
        }) => message,
        _ => body.trim().to_string(),
    }
}
