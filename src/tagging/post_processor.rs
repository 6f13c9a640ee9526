use id3::frame::Picture;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::{resolve, writer, ManualOverride, ResolvedTagSet};
use crate::engine::ytdlp::AUDIO_FORMAT;
use crate::engine::{ItemMetadata, PostProcessOutcome};
use crate::progress::Presenter;

/// Playlist-wide values folded in once per tagged item
#[derive(Debug, Clone, Default)]
pub struct JobAggregate {
    artists: Vec<String>,
    years: Vec<i32>,
}

impl JobAggregate {
    pub fn record(&mut self, tags: &ResolvedTagSet) {
        if let Some(artist) = &tags.artist {
            self.artists.push(artist.clone());
        }
        if let Some(year) = tags.year.as_deref().and_then(|year| year.trim().parse().ok()) {
            self.years.push(year);
        }
    }

    /// Most frequent artist; ties go to the one seen first
    pub fn representative_artist(&self) -> Option<&str> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (position, artist) in self.artists.iter().enumerate() {
            counts.entry(artist.as_str()).or_insert((0, position)).0 += 1;
        }

        counts
            .into_iter()
            .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
                count_a.cmp(count_b).then(first_b.cmp(first_a))
            })
            .map(|(artist, _)| artist)
    }

    pub fn earliest_year(&self) -> Option<i32> {
        self.years.iter().copied().min()
    }

    pub fn artists(&self) -> &[String] {
        &self.artists
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }
}

/// Runs once per finished item: resolves and writes tags, then folds the item
/// into the job aggregate.
pub struct TaggingPostProcessor {
    presenter: Arc<dyn Presenter>,
    manual: Option<ManualOverride>,
    playlist: bool,
    share_cover: bool,
    shared_cover: Option<Picture>,
    aggregate: JobAggregate,
    tagged: usize,
    failed: usize,
}

impl TaggingPostProcessor {
    pub fn new(
        presenter: Arc<dyn Presenter>,
        manual: Option<ManualOverride>,
        playlist: bool,
        share_cover: bool,
    ) -> Self {
        Self {
            presenter,
            manual,
            playlist,
            share_cover: playlist && share_cover,
            shared_cover: None,
            aggregate: JobAggregate::default(),
            tagged: 0,
            failed: 0,
        }
    }

    /// Post-processing hook. Never produces files and hands the metadata back unchanged.
    pub fn process(&mut self, item: ItemMetadata) -> PostProcessOutcome {
        let is_target = item
            .filepath
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(AUDIO_FORMAT));
        if !is_target {
            tracing::debug!("Skipping tags for non-{} file {}", AUDIO_FORMAT, item.filepath.display());
            return (Vec::new(), item);
        }

        let tags = resolve(&item, self.manual.as_ref(), self.playlist);
        let cover = if self.share_cover { self.shared_cover.as_ref() } else { None };

        match writer::write_tags(&item.filepath, &tags, cover) {
            Ok(front_cover) => {
                if self.share_cover && self.shared_cover.is_none() {
                    self.shared_cover = front_cover;
                }
            }
            Err(err) => {
                self.failed += 1;
                tracing::warn!("{}", err);
                self.presenter.log(&format!("Could not tag {}: {}", item.filepath.display(), err));
                return (Vec::new(), item);
            }
        }

        self.tagged += 1;
        let index = item
            .playlist_index
            .map(|index| index as usize)
            .unwrap_or(self.tagged);
        tracing::info!("Tagged {}", item.filepath.display());
        self.presenter.tags_resolved(index, &tags);
        self.aggregate.record(&tags);

        (Vec::new(), item)
    }

    /// Job-end container tagging: attach the representative artist and earliest
    /// year to the playlist directory as extended attributes. Best-effort and silent.
    pub async fn write_container_attributes(&self, dir: &Path) {
        for (name, value) in self.container_attributes() {
            set_extended_attribute(dir, name, &value).await;
        }
    }

    /// Attributes due on the output directory; empty unless the job is a playlist
    pub fn container_attributes(&self) -> Vec<(&'static str, String)> {
        if !self.playlist {
            return Vec::new();
        }

        let mut attributes = Vec::new();
        if let Some(artist) = self.aggregate.representative_artist() {
            attributes.push(("user.artist", artist.to_string()));
        }
        if let Some(year) = self.aggregate.earliest_year() {
            attributes.push(("user.year", year.to_string()));
        }
        attributes
    }

    pub fn aggregate(&self) -> &JobAggregate {
        &self.aggregate
    }

    pub fn tagged(&self) -> usize {
        self.tagged
    }

    pub fn failed(&self) -> usize {
        self.failed
    }
}

async fn set_extended_attribute(path: &Path, name: &str, value: &str) {
    let _ = Command::new("setfattr")
        .args(setfattr_args(path, name, value))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
}

/// `setfattr -n <name> -v "<value>" <path>`. The value is quoted so setfattr never
/// reads it as hex or base64; `\` and `"` are escaped inside the quotes.
fn setfattr_args(path: &Path, name: &str, value: &str) -> Vec<OsString> {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    vec![
        OsString::from("-n"),
        OsString::from(name),
        OsString::from("-v"),
        OsString::from(format!("\"{}\"", escaped)),
        path.as_os_str().to_os_string(),
    ]
}
