use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

pub mod ytdlp;

use crate::Result;

/// Flat enumeration of a URL, produced without downloading anything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInfo {
    /// Video or playlist title
    pub title: Option<String>,

    /// Duration in seconds (single videos only)
    pub duration: Option<f64>,

    /// Playlist entries; `None` for a single video. Unavailable entries are holes.
    pub entries: Option<Vec<Option<EntryInfo>>>,
}

/// One playlist entry as reported by the flat enumeration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
}

impl JobInfo {
    /// Build from the engine's JSON dump
    pub fn from_json(info: &Value) -> Self {
        let entries = if info["_type"].as_str() == Some("playlist") || info.get("entries").is_some() {
            let entries = info["entries"]
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .map(|entry| {
                            if entry.is_null() {
                                None
                            } else {
                                Some(EntryInfo {
                                    title: entry["title"].as_str().map(str::to_string),
                                    duration: entry["duration"].as_f64(),
                                })
                            }
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(entries)
        } else {
            None
        };

        Self {
            title: info["title"].as_str().map(str::to_string),
            duration: info["duration"].as_f64(),
            entries,
        }
    }

    pub fn is_playlist(&self) -> bool {
        self.entries.is_some()
    }

    /// Items expected to download: 1 for a video, non-hole entries for a playlist
    pub fn available_items(&self) -> usize {
        match &self.entries {
            Some(entries) => entries.iter().filter(|entry| entry.is_some()).count(),
            None => 1,
        }
    }
}

/// Raw per-item metadata handed over once the engine has produced the final file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub playlist_title: Option<String>,
    pub playlist_index: Option<u32>,
    pub track_number: Option<u32>,
    pub release_year: Option<i32>,
    pub upload_date: Option<String>,

    /// Final path of the transcoded file on disk
    pub filepath: PathBuf,
}

/// Lifecycle events delivered by the engine's progress hook
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        label: String,
        downloaded: u64,
        /// 0 while the size is not yet known
        total: u64,
    },
    Finished {
        label: String,
    },
}

/// Return shape of the post-processing hook: newly produced files plus passthrough metadata
pub type PostProcessOutcome = (Vec<PathBuf>, ItemMetadata);

/// Callback points the engine drives during a download
pub trait DownloadHooks: Send {
    /// Called arbitrarily often while files download
    fn on_progress(&mut self, event: ProgressEvent);

    /// Called exactly once per completed item, after transcoding
    fn post_process(&mut self, item: ItemMetadata) -> PostProcessOutcome;

    /// Engine diagnostics that are not part of the event stream
    fn on_engine_message(&mut self, _line: &str) {}
}

/// An external engine that performs fetch, decode and encode as one opaque unit
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Enumerate a URL into a single item or a playlist without downloading
    async fn fetch_info(&self, url: &str) -> Result<JobInfo>;

    /// Download and transcode `url`, naming files after `output_template`.
    /// Hooks are invoked sequentially from the calling task.
    async fn download(
        &self,
        url: &str,
        output_template: &str,
        hooks: &mut dyn DownloadHooks,
    ) -> Result<()>;

    /// Get the name of this engine
    fn engine_name(&self) -> &'static str;
}
