use thiserror::Error;

#[derive(Error, Debug)]
pub enum KikitoriError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("{0}")]
    Transcription(String),

    #[error("{0}")]
    Connectivity(String),

    #[error("Transcription failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl KikitoriError {
    /// Configuration problems abort the whole run; everything else is scoped to one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, KikitoriError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, KikitoriError>;
