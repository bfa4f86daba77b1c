use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::classify::{ArtifactLayout, FileState, SourceFile, bytes_to_mb, classify};
use crate::config::Config;
use crate::error::{KikitoriError, Result};
use crate::media::{EncodeRequest, MediaEncoder, MediaEncoderFactory, is_audio_only};
use crate::retry::RetryPolicy;
use crate::transcribe::{ProviderFactory, TranscriptionProvider};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Treat files with an error log as unprocessed
    pub retry_failed: bool,
    pub show_progress: bool,
}

/// Per-run counters, reported at the end and never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub skipped: usize,
    pub already_failed: usize,
    pub optimized: usize,
    pub reused: usize,
    pub transcribed: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(50))?;
        writeln!(f, "Transcription Process Summary:")?;
        writeln!(f, "  Total files processed: {}", self.total)?;
        writeln!(f, "  Files skipped (already transcribed): {}", self.skipped)?;
        writeln!(f, "  Files skipped (previous error log): {}", self.already_failed)?;
        writeln!(f, "  Files optimized: {}", self.optimized)?;
        writeln!(f, "  Optimized files reused: {}", self.reused)?;
        writeln!(f, "  Files successfully transcribed: {}", self.transcribed)?;
        writeln!(f, "  Files failed: {}", self.failed)?;
        write!(f, "{}", "=".repeat(50))
    }
}

pub struct Workflow {
    provider: Box<dyn TranscriptionProvider>,
    encoder: Box<dyn MediaEncoder>,
    layout: ArtifactLayout,
    retry: RetryPolicy,
    options: RunOptions,
    encoder_status: OnceCell<bool>,
}

impl Workflow {
    /// Assemble a workflow and create its directories
    pub fn new(
        provider: Box<dyn TranscriptionProvider>,
        encoder: Box<dyn MediaEncoder>,
        layout: ArtifactLayout,
        retry: RetryPolicy,
        options: RunOptions,
    ) -> Result<Self> {
        layout.ensure_dirs()?;

        Ok(Self {
            provider,
            encoder,
            layout,
            retry,
            options,
            encoder_status: OnceCell::new(),
        })
    }

    /// Build from configuration. The provider is resolved before any directory is touched.
    pub fn from_config(config: &Config, base_dir: &Path, options: RunOptions) -> Result<Self> {
        let provider = ProviderFactory::from_config(config)?;
        let encoder = MediaEncoderFactory::create_encoder(config.media.clone());
        let layout = layout_from_config(config, base_dir);
        let retry = RetryPolicy::new(
            config.transcription.max_retries,
            Duration::from_secs(config.transcription.retry_delay_secs),
        );

        Self::new(provider, encoder, layout, retry, options)
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.profile().name
    }

    /// Process every candidate in the input directory, one file at a time
    pub async fn process_directory(&self) -> Result<RunSummary> {
        let files = self.layout.list_candidates()?;
        let mut summary = RunSummary {
            total: files.len(),
            ..RunSummary::default()
        };

        if files.is_empty() {
            info!("No files found in {}", self.layout.input_dir.display());
            return Ok(summary);
        }

        info!("Found {} files to process", files.len());
        let progress = self.progress_bar(files.len() as u64);

        for (index, source) in files.iter().enumerate() {
            progress.set_message(source.file_name());
            info!("[{}/{}] Processing: {}", index + 1, summary.total, source.file_name());

            if let Err(e) = self.process_file(source, &mut summary).await {
                if e.is_fatal() {
                    progress.finish_and_clear();
                    return Err(e);
                }
                error!("  Failed to process {}: {}", source.file_name(), e);
                summary.failed += 1;
            }
            progress.inc(1);
        }

        progress.finish_and_clear();
        info!(
            "Run finished: {} transcribed, {} failed, {} skipped",
            summary.transcribed, summary.failed, summary.skipped
        );
        Ok(summary)
    }

    /// Classify, optimize if needed, and transcribe a single file.
    ///
    /// Encode and transcription failures are recorded in `summary`. Other
    /// errors, such as a transcript that cannot be written, are returned for
    /// the caller to count against this file.
    pub async fn process_file(&self, source: &SourceFile, summary: &mut RunSummary) -> Result<()> {
        let profile = self.provider.profile();
        let state = classify(source, &self.layout, profile, self.options.retry_failed);
        debug!("{} classified as {}", source.file_name(), state);

        let upload_path = match state {
            FileState::Transcribed => {
                info!("  Transcription already exists for: {}", source.file_name());
                summary.skipped += 1;
                return Ok(());
            }
            FileState::Failed => {
                info!(
                    "  Previous attempt failed for: {} (see {}; rerun with --retry-failed)",
                    source.file_name(),
                    self.layout.error_log_path(source).display()
                );
                summary.already_failed += 1;
                return Ok(());
            }
            FileState::Ready => {
                info!(
                    "  File doesn't need optimization: {} ({:.2} MB, format: {})",
                    source.file_name(),
                    source.size_mb(),
                    source.extension
                );
                source.path.clone()
            }
            FileState::NeedsOptimization => match self.reusable_optimized(source)? {
                Some(existing) => {
                    info!("  Using existing processed file: {}", existing.display());
                    summary.reused += 1;
                    existing
                }
                None => {
                    info!(
                        "  File needs optimization: {} ({:.2} MB, format: {})",
                        source.file_name(),
                        source.size_mb(),
                        source.extension
                    );
                    match self.optimize(source).await {
                        Ok(optimized) => {
                            summary.optimized += 1;
                            log_reduction(source, &optimized);
                            optimized
                        }
                        Err(e) => {
                            error!("  Skipping file due to optimization failure: {}: {}", source.file_name(), e);
                            summary.failed += 1;
                            return Ok(());
                        }
                    }
                }
            },
        };

        match self.transcribe_with_retry(source, &upload_path).await {
            Ok(transcript) => {
                info!("Transcription saved to: {}", transcript.display());
                summary.transcribed += 1;
            }
            Err(KikitoriError::RetriesExhausted { .. }) => {
                summary.failed += 1;
            }
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Existing optimized file within the size margin; an oversized one is deleted
    pub fn reusable_optimized(&self, source: &SourceFile) -> Result<Option<PathBuf>> {
        let profile = self.provider.profile();
        let path = self
            .layout
            .optimized_path(source, profile.optimization.target_extension);

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => return Ok(None),
        };

        let size_mb = bytes_to_mb(metadata.len());
        let target_mb = profile.target_size_mb();
        if size_mb <= target_mb {
            return Ok(Some(path));
        }

        info!(
            "  Existing processed file is too large ({:.2} MB > {} MB), deleting and recreating",
            size_mb, target_mb
        );
        std::fs::remove_file(&path)?;
        Ok(None)
    }

    /// Walk the bitrate ladder until an output fits the target size.
    ///
    /// Each attempt writes its own staging file; only the chosen one is
    /// renamed to the optimized path. Falls back to the smallest output when
    /// none fits, and fails only if no attempt produced anything.
    pub async fn optimize(&self, source: &SourceFile) -> Result<PathBuf> {
        let profile = self.provider.profile();
        let settings = &profile.optimization;
        let target_mb = profile.target_size_mb();
        let strip_video = !is_audio_only(&source.extension);

        if !self.encoder_available().await {
            return Err(KikitoriError::Encode(format!(
                "media encoder is not available, cannot re-encode {}",
                source.file_name()
            )));
        }

        info!("Optimizing: {} (target: {} MB)", source.file_name(), target_mb);

        let mut staged = Vec::new();
        let mut chosen: Option<PathBuf> = None;
        let mut smallest: Option<(PathBuf, u64)> = None;

        for bitrate in &settings.bitrate_ladder {
            let staging = self
                .layout
                .staging_path(source, bitrate, settings.target_extension);
            staged.push(staging.clone());

            let request = EncodeRequest {
                input: source.path.clone(),
                output: staging.clone(),
                bitrate: bitrate.to_string(),
                channels: settings.channels,
                sample_rate: settings.sample_rate,
                strip_video,
            };

            info!("  Attempting optimization with bitrate: {}", bitrate);
            if let Err(e) = self.encoder.encode(&request).await {
                warn!("  Error optimizing file with bitrate {}: {}", bitrate, e);
                continue;
            }

            let size = match std::fs::metadata(&staging) {
                Ok(metadata) => metadata.len(),
                Err(_) => {
                    warn!("  Encoder reported success but wrote no output at bitrate {}", bitrate);
                    continue;
                }
            };

            let size_mb = bytes_to_mb(size);
            if size_mb <= target_mb {
                info!("  Successfully optimized to {:.2} MB with bitrate {}", size_mb, bitrate);
                chosen = Some(staging);
                break;
            }

            info!(
                "  File still too large: {:.2} MB > {} MB, trying lower bitrate",
                size_mb, target_mb
            );
            if smallest.as_ref().is_none_or(|(_, best)| size < *best) {
                smallest = Some((staging, size));
            }
        }

        let selected = chosen.or_else(|| {
            warn!("  Failed to optimize file under {} MB after trying all bitrates", target_mb);
            smallest.map(|(path, size)| {
                info!("  Using best effort result: {:.2} MB", bytes_to_mb(size));
                path
            })
        });

        let result = match selected {
            Some(staging) => {
                let final_path = self
                    .layout
                    .optimized_path(source, settings.target_extension);
                std::fs::rename(&staging, &final_path)
                    .map(|_| final_path)
                    .map_err(KikitoriError::from)
            }
            None => Err(KikitoriError::Encode(format!(
                "no bitrate in {:?} produced an output for {}",
                settings.bitrate_ladder,
                source.file_name()
            ))),
        };

        for path in staged.iter().filter(|path| path.exists()) {
            if let Err(e) = std::fs::remove_file(path) {
                debug!("Failed to remove staging file {}: {}", path.display(), e);
            }
        }

        result
    }

    /// Upload with retry, then persist the transcript or an error log
    pub async fn transcribe_with_retry(&self, source: &SourceFile, upload_path: &Path) -> Result<PathBuf> {
        let upload_name = upload_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("Transcribing: {}", upload_name);

        let outcome = self
            .retry
            .execute(
                |_| self.provider.transcribe(upload_path),
                |e| self.provider.reclassify_error(e),
            )
            .await;

        match outcome {
            Ok(text) => {
                let transcript = self.layout.transcript_path(source);
                std::fs::write(&transcript, text)?;

                let cleared = self.layout.clear_error_logs(source)?;
                if cleared > 0 {
                    info!("  Removed stale error log for {}", source.file_name());
                }
                Ok(transcript)
            }
            Err(KikitoriError::RetriesExhausted { attempts, message }) => {
                error!("Error transcribing file after {} attempts: {}", attempts, message);
                let log_path = self.write_error_log(source, &message)?;
                info!("Error log written to: {}", log_path.display());
                Err(KikitoriError::RetriesExhausted { attempts, message })
            }
            Err(e) => Err(e),
        }
    }

    /// Check the encoder once per run, before the first re-encode
    async fn encoder_available(&self) -> bool {
        *self
            .encoder_status
            .get_or_init(|| async {
                match self.encoder.check_availability().await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Media encoder is not available, files that need optimization will fail: {}", e);
                        false
                    }
                }
            })
            .await
    }

    fn write_error_log(&self, source: &SourceFile, message: &str) -> Result<PathBuf> {
        let path = self.layout.error_log_path(source);
        let content = format!(
            "Error transcribing file: {}\nTime: {}\nFile: {}\nProvider: {}\n",
            message,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            source.path.display(),
            self.provider_name()
        );
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}") {
            progress.set_style(style.progress_chars("#>-"));
        }
        progress
    }
}

/// Directory layout for a config, relative paths resolved against `base_dir`
pub fn layout_from_config(config: &Config, base_dir: &Path) -> ArtifactLayout {
    ArtifactLayout::new(
        Config::resolve_dir(base_dir, &config.paths.input_dir),
        Config::resolve_dir(base_dir, &config.paths.optimized_dir),
        Config::resolve_dir(base_dir, &config.paths.transcriptions_dir),
    )
}

fn log_reduction(source: &SourceFile, optimized: &Path) {
    let original_mb = source.size_mb();
    let optimized_mb = std::fs::metadata(optimized)
        .map(|metadata| bytes_to_mb(metadata.len()))
        .unwrap_or(0.0);
    let saved = original_mb - optimized_mb;
    let percent = if original_mb > 0.0 {
        saved / original_mb * 100.0
    } else {
        0.0
    };

    info!(
        "  Optimization complete: {:.2} MB -> {:.2} MB (saved {:.2} MB, {:.1}%)",
        original_mb, optimized_mb, saved, percent
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MockMediaEncoder;
    use crate::transcribe::{ProviderKind, ProviderProfile};
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const MB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct ProviderCalls {
        uploads: Mutex<Vec<PathBuf>>,
        scripted: Mutex<VecDeque<Result<String>>>,
    }

    impl ProviderCalls {
        fn count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    /// Returns scripted results in order, then echoes the upload name
    struct ScriptedProvider {
        profile: ProviderProfile,
        calls: Arc<ProviderCalls>,
    }

    #[async_trait]
    impl TranscriptionProvider for ScriptedProvider {
        fn profile(&self) -> &ProviderProfile {
            &self.profile
        }

        async fn transcribe(&self, file_path: &Path) -> Result<String> {
            self.calls.uploads.lock().unwrap().push(file_path.to_path_buf());
            match self.calls.scripted.lock().unwrap().pop_front() {
                Some(result) => result,
                None => Ok(format!("text of {}", file_path.file_name().unwrap().to_string_lossy())),
            }
        }
    }

    fn provider(results: Vec<Result<String>>) -> (Box<dyn TranscriptionProvider>, Arc<ProviderCalls>) {
        let calls = Arc::new(ProviderCalls {
            scripted: Mutex::new(results.into()),
            ..ProviderCalls::default()
        });
        let provider = ScriptedProvider {
            profile: ProviderKind::Groq.profile(),
            calls: calls.clone(),
        };
        (Box::new(provider), calls)
    }

    fn layout(temp: &TempDir) -> ArtifactLayout {
        ArtifactLayout::new(
            temp.path().join("to_transcribe"),
            temp.path().join("space_optimized_files"),
            temp.path().join("transcriptions"),
        )
    }

    fn workflow(
        temp: &TempDir,
        provider: Box<dyn TranscriptionProvider>,
        encoder: MockMediaEncoder,
        options: RunOptions,
    ) -> Workflow {
        Workflow::new(
            provider,
            Box::new(encoder),
            layout(temp),
            RetryPolicy::new(3, Duration::from_secs(5)),
            options,
        )
        .unwrap()
    }

    fn sized_file(path: &Path, bytes: u64) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::File::create(path).unwrap().set_len(bytes).unwrap();
    }

    fn input(temp: &TempDir, name: &str, bytes: u64) -> SourceFile {
        let path = temp.path().join("to_transcribe").join(name);
        sized_file(&path, bytes);
        SourceFile::from_path(path).unwrap()
    }

    /// Encoder that writes outputs of the given sizes (None = exit failure) and records bitrates
    fn ladder_encoder(sizes: Vec<Option<u64>>) -> (MockMediaEncoder, Arc<Mutex<Vec<String>>>) {
        let tried = Arc::new(Mutex::new(Vec::new()));
        let recorder = tried.clone();
        let sizes = Mutex::new(VecDeque::from(sizes));

        let mut encoder = MockMediaEncoder::new();
        encoder.expect_check_availability().returning(|| Ok(()));
        encoder.expect_encode().returning(move |request| {
            recorder.lock().unwrap().push(request.bitrate.clone());
            match sizes.lock().unwrap().pop_front().flatten() {
                Some(bytes) => {
                    sized_file(&request.output, bytes);
                    Ok(())
                }
                None => Err(KikitoriError::Encode("ffmpeg exited with status 1".to_string())),
            }
        });
        (encoder, tried)
    }

    fn idle_encoder() -> MockMediaEncoder {
        let mut encoder = MockMediaEncoder::new();
        encoder.expect_encode().never();
        encoder
    }

    fn staging_leftovers(temp: &TempDir) -> usize {
        std::fs::read_dir(temp.path().join("space_optimized_files"))
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().file_name().to_string_lossy().starts_with('.'))
            .count()
    }

    #[tokio::test]
    async fn test_second_run_does_no_work() {
        let temp = TempDir::new().unwrap();
        input(&temp, "a.mp3", 1024);
        input(&temp, "b.wav", 2048);
        input(&temp, "c.mkv", 30 * MB);

        let (provider_one, calls_one) = provider(vec![]);
        let (encoder, _) = ladder_encoder(vec![Some(5 * MB)]);
        let first = workflow(&temp, provider_one, encoder, RunOptions::default())
            .process_directory()
            .await
            .unwrap();
        assert_eq!(first.transcribed, 3);
        assert_eq!(first.optimized, 1);
        assert_eq!(calls_one.count(), 3);

        let (provider_two, calls_two) = provider(vec![]);
        let second = workflow(&temp, provider_two, idle_encoder(), RunOptions::default())
            .process_directory()
            .await
            .unwrap();
        assert_eq!(calls_two.count(), 0);
        assert_eq!(
            second,
            RunSummary {
                total: 3,
                skipped: 3,
                ..RunSummary::default()
            }
        );
    }

    #[tokio::test]
    async fn test_unwritable_transcript_does_not_stop_the_run() {
        let temp = TempDir::new().unwrap();
        // Source name fits, but "<stem>_transcription.txt" exceeds the file name limit
        let long_name = format!("{}.mp3", "a".repeat(245));
        input(&temp, &long_name, 1024);
        input(&temp, "zz.mp3", 1024);

        let (provider, calls) = provider(vec![]);
        let summary = workflow(&temp, provider, idle_encoder(), RunOptions::default())
            .process_directory()
            .await
            .unwrap();

        assert_eq!(calls.count(), 2);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.transcribed, 1);
        assert_eq!(summary.failed, 1);
        temp.child("transcriptions/zz_transcription.txt").assert("text of zz.mp3");
    }

    #[tokio::test]
    async fn test_missing_encoder_is_checked_once_per_run() {
        let temp = TempDir::new().unwrap();
        input(&temp, "one.mkv", 10);
        input(&temp, "two.mkv", 10);
        input(&temp, "three.mp3", 1024);

        let mut encoder = MockMediaEncoder::new();
        encoder
            .expect_check_availability()
            .times(1)
            .returning(|| Err(KikitoriError::Encode("Failed to execute ffmpeg: not found".to_string())));
        encoder.expect_encode().never();

        let (provider, calls) = provider(vec![]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());
        let summary = flow.process_directory().await.unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.transcribed, 1);
        assert_eq!(calls.uploads.lock().unwrap().as_slice(), &[temp.path().join("to_transcribe/three.mp3")]);
        assert!(!temp.path().join("transcriptions/one_error.log").exists());
    }

    #[tokio::test]
    async fn test_ready_file_is_uploaded_unchanged() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "memo.m4a", 10 * MB);
        let (provider, calls) = provider(vec![Ok("hello".to_string())]);
        let flow = workflow(&temp, provider, idle_encoder(), RunOptions::default());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(calls.uploads.lock().unwrap().as_slice(), &[source.path.clone()]);
        assert_eq!(summary.transcribed, 1);
        assert_eq!(summary.optimized, 0);
        temp.child("transcriptions/memo_transcription.txt").assert("hello");
    }

    #[tokio::test]
    async fn test_ladder_stops_at_first_fit() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "lecture.mp3", 30 * MB);
        let (provider, calls) = provider(vec![]);
        let (encoder, tried) = ladder_encoder(vec![Some(28 * MB), Some(24 * MB), Some(18 * MB), Some(9 * MB)]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(*tried.lock().unwrap(), vec!["64k", "32k", "16k"]);
        let optimized = temp.path().join("space_optimized_files/lecture_processed.mp3");
        assert_eq!(std::fs::metadata(&optimized).unwrap().len(), 18 * MB);
        assert_eq!(calls.uploads.lock().unwrap().as_slice(), &[optimized]);
        assert_eq!(staging_leftovers(&temp), 0);
        assert_eq!(summary.optimized, 1);
        assert_eq!(summary.transcribed, 1);
    }

    #[tokio::test]
    async fn test_best_effort_keeps_smallest_output() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "concert.mp4", 200 * MB);
        let (provider, _) = provider(vec![]);
        let (encoder, tried) = ladder_encoder(vec![Some(26 * MB), Some(22 * MB), None, None]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());

        let optimized = flow.optimize(&source).await.unwrap();

        assert_eq!(tried.lock().unwrap().len(), 4);
        assert_eq!(std::fs::metadata(&optimized).unwrap().len(), 22 * MB);
        assert_eq!(staging_leftovers(&temp), 0);
    }

    #[tokio::test]
    async fn test_encoder_failure_on_every_bitrate_fails_file() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "broken.avi", 10);
        let (provider, calls) = provider(vec![]);
        let (encoder, tried) = ladder_encoder(vec![None, None, None, None]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(tried.lock().unwrap().len(), 4);
        assert_eq!(calls.count(), 0);
        assert_eq!(summary.failed, 1);
        assert!(!flow.layout().has_error_log(&source));
    }

    #[tokio::test]
    async fn test_video_sources_strip_video_track() {
        let temp = TempDir::new().unwrap();
        let video = input(&temp, "clip.mov", 10);
        let audio = input(&temp, "song.flac", 40 * MB);

        let mut encoder = MockMediaEncoder::new();
        encoder.expect_check_availability().times(1).returning(|| Ok(()));
        encoder
            .expect_encode()
            .withf(|request| request.strip_video && request.input.ends_with("clip.mov"))
            .times(1)
            .returning(|request| {
                sized_file(&request.output, MB);
                Ok(())
            });
        encoder
            .expect_encode()
            .withf(|request| {
                !request.strip_video
                    && request.input.ends_with("song.flac")
                    && request.channels == 1
                    && request.sample_rate == 16000
            })
            .times(1)
            .returning(|request| {
                sized_file(&request.output, MB);
                Ok(())
            });

        let (provider, _) = provider(vec![]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());
        flow.optimize(&video).await.unwrap();
        flow.optimize(&audio).await.unwrap();
    }

    #[tokio::test]
    async fn test_existing_optimized_file_is_reused() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "long.mp3", 30 * MB);
        let optimized = temp.path().join("space_optimized_files/long_processed.mp3");
        sized_file(&optimized, 12 * MB);

        let (provider, calls) = provider(vec![]);
        let flow = workflow(&temp, provider, idle_encoder(), RunOptions::default());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(summary.reused, 1);
        assert_eq!(summary.optimized, 0);
        assert_eq!(calls.uploads.lock().unwrap().as_slice(), &[optimized]);
    }

    #[tokio::test]
    async fn test_oversized_optimized_file_is_regenerated() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "long.mp3", 30 * MB);
        let optimized = temp.path().join("space_optimized_files/long_processed.mp3");
        sized_file(&optimized, 22 * MB);

        let (provider, _) = provider(vec![]);
        let (encoder, tried) = ladder_encoder(vec![Some(15 * MB)]);
        let flow = workflow(&temp, provider, encoder, RunOptions::default());

        assert_eq!(flow.reusable_optimized(&source).unwrap(), None);
        assert!(!optimized.exists());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();
        assert_eq!(*tried.lock().unwrap(), vec!["64k"]);
        assert_eq!(std::fs::metadata(&optimized).unwrap().len(), 15 * MB);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_write_error_log() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "call.mp3", 1024);
        let (provider, calls) = provider(vec![
            Err(KikitoriError::Transcription("network error 1".to_string())),
            Err(KikitoriError::Transcription("network error 2".to_string())),
            Err(KikitoriError::Transcription("network error 3".to_string())),
        ]);
        let flow = workflow(&temp, provider, idle_encoder(), RunOptions::default());

        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(calls.count(), 3);
        assert_eq!(summary.failed, 1);
        assert!(!temp.path().join("transcriptions/call_transcription.txt").exists());

        let log = std::fs::read_to_string(temp.path().join("transcriptions/call_error.log")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines[0], "Error transcribing file: network error 3");
        assert!(lines[1].starts_with("Time: "));
        assert_eq!(lines[2], format!("File: {}", source.path.display()));
        assert_eq!(lines[3], "Provider: groq");
        assert!(!log.contains("network error 1"));
    }

    #[tokio::test]
    async fn test_failed_file_is_skipped_on_next_run() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "call.mp3", 1024);
        temp.child("transcriptions").create_dir_all().unwrap();
        temp.child("transcriptions/call_error.log").write_str("Error transcribing file: x\n").unwrap();

        let (provider, calls) = provider(vec![]);
        let flow = workflow(&temp, provider, idle_encoder(), RunOptions::default());
        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(calls.count(), 0);
        assert_eq!(summary.already_failed, 1);
    }

    #[tokio::test]
    async fn test_retry_failed_success_removes_stale_error_log() {
        let temp = TempDir::new().unwrap();
        let source = input(&temp, "call.mp3", 1024);
        temp.child("transcriptions").create_dir_all().unwrap();
        temp.child("transcriptions/call_error.log").write_str("Error transcribing file: x\n").unwrap();

        let (provider, _) = provider(vec![Ok("recovered".to_string())]);
        let options = RunOptions {
            retry_failed: true,
            ..RunOptions::default()
        };
        let flow = workflow(&temp, provider, idle_encoder(), options);
        let mut summary = RunSummary::default();
        flow.process_file(&source, &mut summary).await.unwrap();

        assert_eq!(summary.transcribed, 1);
        temp.child("transcriptions/call_transcription.txt").assert("recovered");
        assert!(!flow.layout().has_error_log(&source));
    }

    #[tokio::test]
    async fn test_unknown_provider_aborts_before_touching_filesystem() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.transcription.provider = "invalid".to_string();

        let err = Workflow::from_config(&config, temp.path(), RunOptions::default())
            .err()
            .unwrap();

        assert!(err.is_fatal());
        assert!(!temp.path().join("to_transcribe").exists());
        assert!(!temp.path().join("transcriptions").exists());
        assert!(!temp.path().join("space_optimized_files").exists());
    }

    #[tokio::test]
    async fn test_missing_api_key_aborts_before_touching_filesystem() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();

        let err = Workflow::from_config(&config, temp.path(), RunOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, KikitoriError::Config(_)));
        assert!(!temp.path().join("to_transcribe").exists());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            total: 4,
            skipped: 1,
            transcribed: 2,
            failed: 1,
            ..RunSummary::default()
        };
        let text = summary.to_string();
        assert!(text.contains("Total files processed: 4"));
        assert!(text.contains("Files successfully transcribed: 2"));
        assert!(text.contains("Files failed: 1"));
    }
}
