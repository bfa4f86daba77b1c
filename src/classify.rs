//! File-state classification.
//!
//! Decides, from the filesystem alone, whether a source file is finished,
//! previously failed, needs re-encoding, or can be uploaded as-is. Nothing
//! here touches the network or spawns a process, so repeated runs over the
//! same directory stay cheap.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{KikitoriError, Result};
use crate::transcribe::{ProviderProfile, extension_of};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// A candidate file in the input directory
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Lower-cased, with a leading dot
    pub extension: String,
}

impl SourceFile {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .map_err(|_| KikitoriError::FileNotFound(path.display().to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
            extension: extension_of(path),
        })
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes)
    }
}

/// Processing state of a source file, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Transcribed,
    Failed,
    NeedsOptimization,
    Ready,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Transcribed => "transcribed",
            FileState::Failed => "error",
            FileState::NeedsOptimization => "needs_optimization",
            FileState::Ready => "ready",
        }
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory layout and artifact naming for one run
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub input_dir: PathBuf,
    pub optimized_dir: PathBuf,
    pub transcriptions_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new<P: Into<PathBuf>>(input_dir: P, optimized_dir: P, transcriptions_dir: P) -> Self {
        Self {
            input_dir: input_dir.into(),
            optimized_dir: optimized_dir.into(),
            transcriptions_dir: transcriptions_dir.into(),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.input_dir, &self.optimized_dir, &self.transcriptions_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn transcript_path(&self, source: &SourceFile) -> PathBuf {
        self.transcriptions_dir
            .join(format!("{}_transcription.txt", source.stem()))
    }

    pub fn error_log_path(&self, source: &SourceFile) -> PathBuf {
        self.transcriptions_dir.join(format!("{}_error.log", source.stem()))
    }

    pub fn optimized_path(&self, source: &SourceFile, target_extension: &str) -> PathBuf {
        self.optimized_dir
            .join(format!("{}_processed{}", source.stem(), target_extension))
    }

    /// Per-bitrate encoder output, promoted to `optimized_path` once chosen
    pub fn staging_path(&self, source: &SourceFile, bitrate: &str, target_extension: &str) -> PathBuf {
        self.optimized_dir
            .join(format!(".{}_processed.{}{}", source.stem(), bitrate, target_extension))
    }

    /// Transcript names this file may have been saved under
    fn transcript_candidates(&self, source: &SourceFile) -> [PathBuf; 2] {
        [
            self.transcript_path(source),
            self.transcriptions_dir
                .join(format!("{}_processed_transcription.txt", source.stem())),
        ]
    }

    fn error_log_candidates(&self, source: &SourceFile) -> [PathBuf; 2] {
        [
            self.error_log_path(source),
            self.transcriptions_dir
                .join(format!("{}_processed_error.log", source.stem())),
        ]
    }

    pub fn has_transcript(&self, source: &SourceFile) -> bool {
        self.transcript_candidates(source).iter().any(|path| path.is_file())
    }

    pub fn has_error_log(&self, source: &SourceFile) -> bool {
        self.error_log_candidates(source).iter().any(|path| path.is_file())
    }

    /// Remove error logs left by earlier failed runs; returns how many were deleted
    pub fn clear_error_logs(&self, source: &SourceFile) -> Result<usize> {
        let mut removed = 0;
        for path in self.error_log_candidates(source) {
            if path.is_file() {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Regular, non-hidden files directly inside the input directory, sorted by name.
    ///
    /// Symlinks are followed. Entries that cannot be read are skipped with a
    /// warning; a missing input directory has no candidates.
    pub fn list_candidates(&self) -> Result<Vec<SourceFile>> {
        if !self.input_dir.is_dir() {
            debug!("Input directory does not exist: {}", self.input_dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.input_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", self.input_dir.display(), e);
                    continue;
                }
            };

            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !entry.file_type().is_file() || hidden {
                continue;
            }

            match SourceFile::from_path(entry.path()) {
                Ok(source) => files.push(source),
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        Ok(files)
    }
}

/// Whether the provider can take the file without re-encoding
pub fn needs_optimization(source: &SourceFile, profile: &ProviderProfile) -> bool {
    source.size_mb() > profile.max_upload_mb as f64 || !profile.supports_extension(&source.extension)
}

/// Classify a source file. With `retry_failed`, an existing error log is ignored.
pub fn classify(
    source: &SourceFile,
    layout: &ArtifactLayout,
    profile: &ProviderProfile,
    retry_failed: bool,
) -> FileState {
    if layout.has_transcript(source) {
        FileState::Transcribed
    } else if !retry_failed && layout.has_error_log(source) {
        FileState::Failed
    } else if needs_optimization(source, profile) {
        FileState::NeedsOptimization
    } else {
        FileState::Ready
    }
}
