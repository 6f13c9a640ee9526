//! ytmd - A Rust CLI and terminal UI for downloading YouTube audio as tagged MP3 files
//!
//! This library drives yt-dlp as an external download/transcode engine, observes its
//! progress and post-processing callbacks, and writes ID3 tags into every finished track.

pub mod cli;
pub mod config;
pub mod engine;
pub mod job;
pub mod output;
pub mod progress;
pub mod tagging;
pub mod tui;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use engine::{ItemMetadata, MediaEngine};
pub use job::{JobOptions, JobReport};
pub use tagging::{ManualOverride, ResolvedTagSet};

use std::path::PathBuf;

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to ytmd
#[derive(thiserror::Error, Debug)]
pub enum YtmdError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No URL given and batch file {0} does not exist")]
    NoInput(PathBuf),

    #[error("Download engine failed: {0}")]
    EngineFailed(String),

    #[error("Nothing to download for {0}")]
    NothingToDownload(String),

    #[error("Tagging failed for {path}: {source}")]
    Tagging {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },
}
