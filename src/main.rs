//! Kikitori - Batch Audio/Video Transcription
//!
//! Entry point: loads configuration, resolves the provider, and runs the
//! selected command.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{Level, info};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use kikitori::classify::classify;
use kikitori::cli::{Args, Commands};
use kikitori::config::{Config, DEFAULT_CONFIG_FILE};
use kikitori::error::KikitoriError;
use kikitori::transcribe::{ProviderFactory, ProviderKind};
use kikitori::workflow::{RunOptions, Workflow, layout_from_config};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("Failed to load .env file: {}", e));
        }
    }

    let (mut config, base_dir) = load_config(args.config.as_deref())?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;
    if let Some(provider) = &args.provider {
        config.transcription.provider = provider.clone();
    }

    match args.command {
        Commands::Run { retry_failed, no_progress } => {
            let options = RunOptions {
                retry_failed,
                show_progress: !no_progress,
            };

            // Provider and API key are validated here, before any directory or log file exists
            let workflow = Workflow::from_config(&config, &base_dir, options)?;
            setup_logging(args.verbose, Some(&base_dir.join(".kikitori").join("log")))?;

            info!(
                "Starting audio/video transcription process using {} provider...",
                workflow.provider_name().to_uppercase()
            );
            let summary = workflow.process_directory().await?;
            println!("\n{}", summary);
            info!("Transcription process completed");
        }
        Commands::Status { retry_failed } => {
            setup_logging(args.verbose, None)?;

            let kind = ProviderFactory::kind_from_config(&config)?;
            let profile = kind.profile();
            let layout = layout_from_config(&config, &base_dir);
            let files = layout.list_candidates()?;

            if files.is_empty() {
                println!("No files found in {}", layout.input_dir.display());
                return Ok(());
            }

            println!("\nProvider: {} (max {} MB)", profile.name, profile.max_upload_mb);
            println!("{:<20} {:>10} {:<8} {:<50}", "State", "Size (MB)", "Format", "File");
            println!("{}", "-".repeat(90));
            for file in &files {
                let state = classify(file, &layout, &profile, retry_failed);
                println!(
                    "{:<20} {:>10.2} {:<8} {:<50}",
                    state.as_str(),
                    file.size_mb(),
                    file.extension,
                    file.file_name()
                );
            }
        }
        Commands::Providers => {
            println!("\nTranscription Providers:");
            println!("{:<10} {:<10} {:<16} {:<20} {:<50}", "Name", "Max (MB)", "API key", "Bitrate ladder", "Formats");
            println!("{}", "-".repeat(106));

            for kind in ProviderKind::ALL {
                let profile = kind.profile();
                let marker = if kind.as_str() == config.transcription.provider.to_lowercase() {
                    " *"
                } else {
                    ""
                };
                println!(
                    "{:<10} {:<10} {:<16} {:<20} {:<50}",
                    format!("{}{}", kind, marker),
                    profile.max_upload_mb,
                    kind.api_key_var(),
                    profile.optimization.bitrate_ladder.join(","),
                    profile.supported_extensions.join(" ")
                );
            }
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(KikitoriError::Config(format!(
                    "{} already exists; pass --force to overwrite",
                    output.display()
                ))
                .into());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Load the config file and return it with the directory relative paths resolve against
fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let cwd = std::env::current_dir()?;

    let path = match path {
        Some(path) => path.to_path_buf(),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
        None => return Ok((Config::default(), cwd)),
    };

    let config = Config::from_file(&path)?;
    let base_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => cwd.join(parent),
        _ => cwd,
    };
    Ok((config, base_dir))
}

/// Setup logging to the console and, when a directory is given, a daily rolling file
fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = rolling::daily(dir, "kikitori.log");
            let (non_blocking_file, guard) = non_blocking(file_appender);
            // Keep the guard alive for the duration of the program
            std::mem::forget(guard);

            Some(
                fmt::layer()
                    .with_writer(non_blocking_file)
                    .with_target(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    if let Some(dir) = log_dir {
        info!("Logging initialized - console: {}, file: {}", log_level, dir.join("kikitori.log").display());
    }

    Ok(())
}
