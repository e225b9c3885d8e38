//! Tag reading with lofty.

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey, ItemValue, Tag};
use std::path::Path;

use super::{RawTags, TagExtractor, TagFields, split_values};
use crate::error::{Error, Result};

/// [`TagExtractor`] backed by lofty; format is sniffed from content first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyExtractor;

impl TagExtractor for LoftyExtractor {
    fn extract(&self, path: &Path) -> Result<RawTags> {
        let tagged_file = Probe::open(path)
            .map_err(|e| Error::metadata(path, format!("Failed to open file for probing: {e}")))?
            .guess_file_type()
            .map_err(|e| Error::metadata(path, format!("Failed to guess file type: {e}")))?
            .read()
            .map_err(|e| Error::metadata(path, format!("Failed to read file metadata: {e}")))?;

        let duration_ms =
            i64::try_from(tagged_file.properties().duration().as_millis()).unwrap_or(i64::MAX);

        let fields = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .map(fields_from_tag)
            .unwrap_or_default();

        Ok(RawTags { fields, duration_ms })
    }
}

fn text(tag: &Tag, key: ItemKey) -> Option<String> {
    tag.get_string(&key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn texts(tag: &Tag, key: ItemKey) -> Vec<String> {
    split_values(tag.get_strings(&key))
}

fn fields_from_tag(tag: &Tag) -> TagFields {
    TagFields {
        title: text(tag, ItemKey::TrackTitle),
        version: text(tag, ItemKey::TrackSubtitle),
        artists: texts(tag, ItemKey::TrackArtist),
        artist_sortnames: texts(tag, ItemKey::TrackArtistSortOrder),
        album_artists: texts(tag, ItemKey::AlbumArtist),
        album_artist_sortnames: texts(tag, ItemKey::AlbumArtistSortOrder),
        performers: texts(tag, ItemKey::Performer),
        composers: texts(tag, ItemKey::Composer),
        remixers: texts(tag, ItemKey::Remixer),
        album: text(tag, ItemKey::AlbumTitle),
        genres: texts(tag, ItemKey::Genre),
        disc_number: tag.disk(),
        disc_name: text(tag, ItemKey::SetSubtitle),
        track_number: tag.track(),
        original_date: text(tag, ItemKey::OriginalReleaseDate),
        date: text(tag, ItemKey::RecordingDate)
            .or_else(|| text(tag, ItemKey::Year))
            .or_else(|| text(tag, ItemKey::ReleaseDate)),
        mb_track_id: text(tag, ItemKey::MusicBrainzRecordingId),
        mb_album_id: text(tag, ItemKey::MusicBrainzReleaseId),
        mb_artist_ids: texts(tag, ItemKey::MusicBrainzArtistId),
        mb_album_artist_ids: texts(tag, ItemKey::MusicBrainzReleaseArtistId),
        bpm: text(tag, ItemKey::Bpm)
            .or_else(|| text(tag, ItemKey::IntegerBpm))
            .and_then(|b| b.parse().ok()),
        popularimeter: popularimeter(tag),
    }
}

/// Popularimeter byte from an ID3 `POPM` frame or a plain `RATING` field.
fn popularimeter(tag: &Tag) -> Option<u8> {
    [
        ItemKey::Popularimeter,
        ItemKey::Unknown("POPM".to_string()),
        ItemKey::Unknown("RATING".to_string()),
    ]
    .into_iter()
    .find_map(|key| {
        let item = tag.get(&key)?;
        match item.value() {
            ItemValue::Binary(bytes) => parse_popm(bytes),
            ItemValue::Text(value) => value.trim().parse().ok(),
            _ => None,
        }
    })
}

// POPM layout: email, NUL, rating byte, optional play counter.
fn parse_popm(bytes: &[u8]) -> Option<u8> {
    let nul = bytes.iter().position(|b| *b == 0)?;
    bytes.get(nul + 1).copied()
}
