//! Persist a `ResolvedTagSet` into an MP3's ID3 tag.

use id3::frame::Picture;
use id3::{ErrorKind, Tag, TagLike, Version};
use std::path::Path;

use super::ResolvedTagSet;
use crate::YtmdError;

/// Read the existing tag, or start an empty one when the file has no header yet
/// (the normal state of a freshly transcoded file).
pub fn open_or_init(path: &Path) -> Result<Tag, id3::Error> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(tag),
        Err(err) if matches!(err.kind, ErrorKind::NoTag) => {
            tracing::debug!("No ID3 header in {}, starting a new one", path.display());
            Ok(Tag::new())
        }
        Err(err) => Err(err),
    }
}

/// Set a text frame only when a value exists; absent values leave the frame untouched.
fn set_text_opt(tag: &mut Tag, id: &str, value: &Option<String>) -> bool {
    match value {
        Some(value) => {
            tag.set_text(id, value.clone());
            true
        }
        None => false,
    }
}

/// Apply every present field; returns how many frames were set
pub fn apply(tag: &mut Tag, tags: &ResolvedTagSet) -> usize {
    [
        set_text_opt(tag, "TIT2", &tags.title),
        set_text_opt(tag, "TPE1", &tags.artist),
        set_text_opt(tag, "TALB", &tags.album),
        set_text_opt(tag, "TDRC", &tags.year),
        set_text_opt(tag, "TRCK", &tags.track),
    ]
    .into_iter()
    .filter(|written| *written)
    .count()
}

/// Write `tags` into the file at `path`.
///
/// When `shared_cover` is given it replaces whatever pictures the file carries.
/// Returns the first picture present in the file after writing, so a caller can
/// share it with later tracks.
pub fn write_tags(
    path: &Path,
    tags: &ResolvedTagSet,
    shared_cover: Option<&Picture>,
) -> Result<Option<Picture>, YtmdError> {
    let tagging_error = |source: id3::Error| YtmdError::Tagging {
        path: path.to_path_buf(),
        source,
    };

    let mut tag = open_or_init(path).map_err(tagging_error)?;

    apply(&mut tag, tags);

    if let Some(cover) = shared_cover {
        tag.remove_all_pictures();
        let _ = tag.add_frame(cover.clone());
    }

    tag.write_to_path(path, Version::Id3v24).map_err(tagging_error)?;

    let front = tag.pictures().next().cloned();
    Ok(front)
}
