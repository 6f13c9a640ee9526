use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{DownloadHooks, ItemMetadata, JobInfo, MediaEngine, ProgressEvent};
use crate::config::EngineConfig;
use crate::{Result, YtmdError};

const PROGRESS_MARKER: &str = "ytmd-progress\t";
const ITEM_MARKER: &str = "ytmd-item\t";

/// Fields printed for every item once yt-dlp has moved the final file into place
const ITEM_FIELDS: &str = "title,artist,artists,creator,album,playlist_title,playlist_index,\
track_number,release_year,upload_date,filepath";

/// Target audio codec; the tagger only understands ID3 containers
pub const AUDIO_FORMAT: &str = "mp3";

/// YouTube download engine backed by the yt-dlp executable
pub struct YtDlpEngine {
    yt_dlp_path: String,
    audio_quality: u32,
    embed_thumbnail: bool,
}

/// One line of engine output, classified
#[derive(Debug, PartialEq)]
enum EngineLine {
    Progress(ProgressEvent),
    Item(ItemMetadata),
    Error(String),
    Other,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawItem {
    title: Option<String>,
    artist: Option<String>,
    artists: Option<Vec<String>>,
    creator: Option<String>,
    album: Option<String>,
    playlist_title: Option<String>,
    playlist_index: Option<u32>,
    track_number: Option<u32>,
    release_year: Option<i32>,
    upload_date: Option<String>,
    filepath: Option<PathBuf>,
}

impl YtDlpEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            audio_quality: config.audio_quality,
            embed_thumbnail: config.embed_thumbnail,
        }
    }

    fn download_args(&self, url: &str, output_template: &str) -> Vec<String> {
        let progress_template = format!(
            "download:{PROGRESS_MARKER}%(progress.status)s\t%(progress.downloaded_bytes)s\t\
%(progress.total_bytes)s\t%(progress.total_bytes_estimate)s\t%(progress.filename)s\t%(info.title)s"
        );
        let item_template = format!("after_move:{ITEM_MARKER}%(.{{{ITEM_FIELDS}}})j");

        let mut args = vec![
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            AUDIO_FORMAT.to_string(),
            "--audio-quality".to_string(),
            format!("{}K", self.audio_quality),
        ];
        if self.embed_thumbnail {
            args.push("--embed-thumbnail".to_string());
        }
        args.extend(
            [
                // Unavailable playlist entries become holes instead of aborting the job
                "--ignore-errors",
                "--no-warnings",
                "--no-mtime",
                "--newline",
                "--progress",
                "--progress-template",
                progress_template.as_str(),
                "--print",
                item_template.as_str(),
                "--output",
                output_template,
                url,
            ]
            .map(str::to_string),
        );
        args
    }

    fn dispatch(line: &str, hooks: &mut dyn DownloadHooks, items: &mut usize) {
        match parse_line(line) {
            EngineLine::Progress(event) => hooks.on_progress(event),
            EngineLine::Item(item) => {
                *items += 1;
                let (produced, _) = hooks.post_process(item);
                if !produced.is_empty() {
                    tracing::debug!("Post-processor reported {} extra files", produced.len());
                }
            }
            EngineLine::Error(message) => {
                tracing::warn!("yt-dlp: {}", message);
                hooks.on_engine_message(&message);
            }
            EngineLine::Other => tracing::trace!("yt-dlp: {}", line),
        }
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    async fn fetch_info(&self, url: &str) -> Result<JobInfo> {
        tracing::debug!("Enumerating: {}", url);

        let output = Command::new(&self.yt_dlp_path)
            .args([
                "--flat-playlist",
                "--dump-single-json",
                "--ignore-errors",
                "--no-warnings",
                url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(YtmdError::EngineFailed(format!("could not read {}: {}", url, error.trim())).into());
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .context("Failed to parse yt-dlp metadata")?;

        Ok(JobInfo::from_json(&info))
    }

    async fn download(
        &self,
        url: &str,
        output_template: &str,
        hooks: &mut dyn DownloadHooks,
    ) -> Result<()> {
        tracing::debug!("Downloading {} into {}", url, output_template);

        let mut child = Command::new(&self.yt_dlp_path)
            .args(self.download_args(url, output_template))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.yt_dlp_path))?;

        let stdout = child.stdout.take().context("yt-dlp stdout not captured")?;
        let stderr = child.stderr.take().context("yt-dlp stderr not captured")?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);
        let mut items = 0usize;

        // Both streams are drained on this task so hooks never run concurrently
        while out_open || err_open {
            tokio::select! {
                line = out_lines.next_line(), if out_open => match line? {
                    Some(line) => Self::dispatch(&line, hooks, &mut items),
                    None => out_open = false,
                },
                line = err_lines.next_line(), if err_open => match line? {
                    Some(line) => Self::dispatch(&line, hooks, &mut items),
                    None => err_open = false,
                },
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            if items == 0 {
                return Err(YtmdError::EngineFailed(format!("yt-dlp exited with {}", status)).into());
            }
            tracing::warn!("yt-dlp exited with {} after {} items; keeping partial results", status, items);
        }

        Ok(())
    }

    fn engine_name(&self) -> &'static str {
        "yt-dlp"
    }
}

fn parse_line(line: &str) -> EngineLine {
    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        return parse_progress(rest).map_or(EngineLine::Other, EngineLine::Progress);
    }
    if let Some(rest) = line.strip_prefix(ITEM_MARKER) {
        return match parse_item(rest) {
            Some(item) => EngineLine::Item(item),
            None => {
                tracing::warn!("Unreadable item record from yt-dlp: {}", rest);
                EngineLine::Other
            }
        };
    }
    if let Some(message) = line.strip_prefix("ERROR:") {
        return EngineLine::Error(message.trim().to_string());
    }
    EngineLine::Other
}

fn parse_progress(fields: &str) -> Option<ProgressEvent> {
    let mut parts = fields.splitn(6, '\t');
    let status = parts.next()?;
    let downloaded = parse_bytes(parts.next()?);
    let total = parse_bytes(parts.next()?);
    let estimate = parse_bytes(parts.next()?);
    let filename = available(parts.next()?);
    let title = parts.next().and_then(available);

    let label = title
        .map(str::to_string)
        .or_else(|| {
            filename.map(|name| {
                Path::new(name)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.to_string())
            })
        })
        .unwrap_or_else(|| "Unknown".to_string());

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            label,
            downloaded: downloaded.unwrap_or(0),
            total: total.filter(|bytes| *bytes > 0).or(estimate).unwrap_or(0),
        }),
        "finished" => Some(ProgressEvent::Finished { label }),
        _ => None,
    }
}

fn parse_item(json: &str) -> Option<ItemMetadata> {
    let raw: RawItem = serde_json::from_str(json).ok()?;

    let artist = raw
        .artist
        .or_else(|| raw.artists.filter(|artists| !artists.is_empty()).map(|artists| artists.join(", ")))
        .or(raw.creator);

    Some(ItemMetadata {
        title: raw.title,
        artist,
        album: raw.album,
        playlist_title: raw.playlist_title,
        playlist_index: raw.playlist_index,
        track_number: raw.track_number,
        release_year: raw.release_year,
        upload_date: raw.upload_date,
        filepath: raw.filepath?,
    })
}

/// yt-dlp prints `NA` for fields it does not know
fn available(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != "NA").then_some(value)
}

fn parse_bytes(value: &str) -> Option<u64> {
    available(value)?
        .parse::<f64>()
        .ok()
        .filter(|bytes| bytes.is_finite() && *bytes >= 0.0)
        .map(|bytes| bytes as u64)
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
