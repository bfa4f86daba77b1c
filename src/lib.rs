//! Kikitori - Batch Audio/Video Transcription
//!
//! Scans a directory of recordings, re-encodes anything a speech-to-text
//! provider would reject, uploads the rest with retry, and leaves a transcript
//! or an error log next to each source. Already-finished files are skipped,
//! so runs can be repeated safely.

pub mod cli;
pub mod config;
pub mod classify;
pub mod error;
pub mod media;
pub mod retry;
pub mod transcribe;
pub mod workflow;
