use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ytmd",
    about = "ytmd - Download YouTube videos and playlists as tagged MP3 files",
    version,
    long_about = "A CLI and terminal UI for downloading audio from YouTube videos or playlists. Audio is transcoded to MP3 by yt-dlp and every track is tagged with title, artist, album, year and track number."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a video or playlist, or every URL in the batch file
    Download {
        /// Video or playlist URL (falls back to the batch file if omitted)
        #[arg(value_name = "URL")]
        url: Option<String>,

        /// Newline-delimited file of URLs used when no URL is given
        #[arg(short, long, value_name = "FILE")]
        batch_file: Option<PathBuf>,
    },

    /// Open the interactive terminal UI
    Tui,

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
