use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path (defaults to ./kikitori.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Transcription provider, overriding TRANSCRIPTION_PROVIDER and the config file
    #[arg(short, long)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe every pending file in the input directory
    Run {
        /// Also retry files that have an error log from a previous run
        #[arg(long)]
        retry_failed: bool,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show how each input file would be handled, without processing anything
    Status {
        /// Classify files with an error log as if they were new
        #[arg(long)]
        retry_failed: bool,
    },

    /// List supported providers and their upload limits
    Providers,

    /// Write a default configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "kikitori.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
