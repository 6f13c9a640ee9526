//! Metadata resolution: turns the engine's raw per-item record plus optional manual
//! overrides into the tag set written into each file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

use crate::engine::ItemMetadata;

pub mod post_processor;
pub mod writer;

pub use post_processor::{JobAggregate, TaggingPostProcessor};

/// Playlists titled upstream as "Album - <name>"
pub const ALBUM_PREFIX: &str = "Album - ";

static TRACK_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\s*-\s*").unwrap());

/// User-supplied values that win over anything derived, field by field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
}

impl ManualOverride {
    /// `None` when no field carries a value
    pub fn from_fields(artist: &str, album: &str, year: &str) -> Option<Self> {
        let manual = Self {
            artist: non_empty(Some(artist)),
            album: non_empty(Some(album)),
            year: non_empty(Some(year)),
        };
        (manual != Self::default()).then_some(manual)
    }
}

/// Final tags for one file. `None` fields are never written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTagSet {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub track: Option<String>,
}

/// Compute the tag set for one item. Each field is derived independently.
pub fn resolve(raw: &ItemMetadata, manual: Option<&ManualOverride>, playlist: bool) -> ResolvedTagSet {
    let title = raw
        .title
        .clone()
        .filter(|title| !title.trim().is_empty())
        .or_else(|| title_from_path(&raw.filepath));

    let artist = manual
        .and_then(|m| non_empty(m.artist.as_deref()))
        .or_else(|| non_empty(raw.artist.as_deref()));

    let album = manual
        .and_then(|m| non_empty(m.album.as_deref()))
        .or_else(|| non_empty(raw.album.as_deref()))
        .or_else(|| if playlist { non_empty(raw.playlist_title.as_deref()) } else { None })
        .map(|album| strip_album_prefix(&album).to_string());

    let year = manual
        .and_then(|m| non_empty(m.year.as_deref()))
        .or_else(|| raw.release_year.map(|year| year.to_string()))
        .or_else(|| raw.upload_date.as_deref().and_then(year_from_upload_date));

    let track = (if playlist { raw.playlist_index } else { None })
        .or(raw.track_number)
        .map(|track| track.to_string());

    ResolvedTagSet { title, artist, album, year, track }
}

/// Drop the upstream "Album - " prefix, if any
pub fn strip_album_prefix(album: &str) -> &str {
    album.strip_prefix(ALBUM_PREFIX).unwrap_or(album)
}

/// Title derived from a file name such as `03 - Song.mp3`
pub fn title_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_string_lossy();
    let title = TRACK_PREFIX.replace(&stem, "");
    non_empty(Some(title.as_ref()))
}

/// `YYYYMMDD` upload dates contribute their first four characters
fn year_from_upload_date(date: &str) -> Option<String> {
    let date = date.trim();
    if date.chars().count() < 4 {
        return None;
    }
    Some(date.chars().take(4).collect())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
