//! Audio file metadata extraction.
//!
//! [`TagExtractor`] is the seam between the scanner and the tag-reading
//! library. [`LoftyExtractor`] reads raw tag values with the lofty crate;
//! [`TrackTags::resolve`] then applies the fallback rules that turn raw
//! values into what gets stored:
//!
//! 1. Title: tag value, else the file name (plus `" (version)"` when a
//!    version/subtitle tag exists)
//! 2. Artists: artist tag, else album artist, else performer (with composer
//!    taking the album artist slot), else [`UNKNOWN`]
//! 3. Year: original release date, else the plain year/recording date
//! 4. Rating: embedded popularimeter, only used when nothing better exists

mod reader;

pub use reader::LoftyExtractor;

use chrono::NaiveDate;
use std::path::Path;

use crate::error::Result;
use crate::model::UNKNOWN;

/// Reads raw tags and duration from a media file.
pub trait TagExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<RawTags>;
}

/// Tag values as found in the file, before any fallback is applied.
///
/// Multi-valued fields hold one entry per value; `;`-separated values are
/// already split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFields {
    pub title: Option<String>,
    pub version: Option<String>,
    pub artists: Vec<String>,
    pub artist_sortnames: Vec<String>,
    pub album_artists: Vec<String>,
    pub album_artist_sortnames: Vec<String>,
    pub performers: Vec<String>,
    pub composers: Vec<String>,
    pub remixers: Vec<String>,
    pub album: Option<String>,
    pub genres: Vec<String>,
    pub disc_number: Option<u32>,
    pub disc_name: Option<String>,
    pub track_number: Option<u32>,
    pub original_date: Option<String>,
    pub date: Option<String>,
    pub mb_track_id: Option<String>,
    pub mb_album_id: Option<String>,
    pub mb_artist_ids: Vec<String>,
    pub mb_album_artist_ids: Vec<String>,
    pub bpm: Option<f64>,
    /// Raw popularimeter value (0-255)
    pub popularimeter: Option<u8>,
}

/// Output of a [`TagExtractor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTags {
    pub fields: TagFields,
    pub duration_ms: i64,
}

/// Tags after fallback resolution, ready for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTags {
    pub title: String,
    pub artists: Vec<String>,
    pub artist_sortnames: Vec<String>,
    pub album_artists: Vec<String>,
    pub album_artist_sortnames: Vec<String>,
    pub album_name: String,
    pub genres: Vec<String>,
    pub disc_number: u32,
    pub disc_name: String,
    pub track_number: u32,
    pub year: Option<i32>,
    pub timestamp: Option<i64>,
    pub mb_track_id: String,
    pub mb_album_id: String,
    pub mb_artist_ids: Vec<String>,
    pub mb_album_artist_ids: Vec<String>,
    pub bpm: f64,
    /// Rating derived from the popularimeter (0-5)
    pub rating: i64,
    pub duration_ms: i64,
}

impl TrackTags {
    /// Apply the fallback chain to raw tags of the file named `basename`.
    pub fn resolve(raw: RawTags, basename: &str) -> Self {
        let f = raw.fields;

        let mut title = f.title.unwrap_or_else(|| basename.to_string());
        if let Some(version) = f.version {
            title = format!("{title} ({version})");
        }

        let composer_substituted = f.artists.is_empty() && f.album_artists.is_empty();
        let (mut artists, album_artists) =
            resolve_artists(f.artists, f.album_artists, f.performers, f.composers);
        artists.extend(f.remixers);

        let (album_artist_sortnames, mb_album_artist_ids) = if composer_substituted {
            (Vec::new(), Vec::new())
        } else {
            (f.album_artist_sortnames, f.mb_album_artist_ids)
        };

        let (year, timestamp) = resolve_year(f.original_date.as_deref(), f.date.as_deref());

        let genres = if f.genres.is_empty() {
            vec![UNKNOWN.to_string()]
        } else {
            f.genres
        };

        Self {
            title,
            artists,
            artist_sortnames: f.artist_sortnames,
            album_artists,
            album_artist_sortnames,
            album_name: f.album.unwrap_or_else(|| UNKNOWN.to_string()),
            genres,
            disc_number: f.disc_number.unwrap_or(0),
            disc_name: f.disc_name.unwrap_or_default(),
            track_number: f
                .track_number
                .or_else(|| track_number_from_name(basename))
                .unwrap_or(0),
            year,
            timestamp,
            mb_track_id: f.mb_track_id.unwrap_or_default(),
            mb_album_id: f.mb_album_id.unwrap_or_default(),
            mb_artist_ids: f.mb_artist_ids,
            mb_album_artist_ids,
            bpm: f.bpm.unwrap_or(0.0),
            rating: f.popularimeter.map(popm_rating).unwrap_or(0),
            duration_ms: raw.duration_ms,
        }
    }
}

/// Resolve `(artists, album_artists)` from the four artist-like tags.
pub fn resolve_artists(
    artists: Vec<String>,
    album_artists: Vec<String>,
    performers: Vec<String>,
    composers: Vec<String>,
) -> (Vec<String>, Vec<String>) {
    let mut artists = artists;
    let mut album_artists = album_artists;

    if artists.is_empty() {
        artists = album_artists.clone();
    }
    if artists.is_empty() {
        artists = performers;
        album_artists = composers;
        if artists.is_empty() {
            artists = album_artists.clone();
        }
        if artists.is_empty() {
            artists = vec![UNKNOWN.to_string()];
        }
    }
    (artists, album_artists)
}

/// `(year, timestamp)` from the original release date, else the plain date.
pub fn resolve_year(original: Option<&str>, date: Option<&str>) -> (Option<i32>, Option<i64>) {
    original
        .and_then(parse_date)
        .or_else(|| date.and_then(parse_date))
        .map(|(year, ts)| (Some(year), Some(ts)))
        .unwrap_or((None, None))
}

/// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD[...]` into a year and the unix
/// timestamp of that day at midnight UTC.
pub fn parse_date(text: &str) -> Option<(i32, i64)> {
    let text = text.trim();
    let year: i32 = text.get(..4)?.parse().ok()?;
    let mut parts = text.get(4..).unwrap_or("").split(['-', 'T', ' ']).skip(1);
    let month = parts
        .next()
        .and_then(|m| m.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
        .unwrap_or(1);
    let day = parts
        .next()
        .and_then(|d| d.parse::<u32>().ok())
        .unwrap_or(1);
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))?;
    let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
    Some((year, timestamp))
}

/// Map a 0-255 popularimeter value to a 0-5 rating.
pub fn popm_rating(popm: u8) -> i64 {
    match popm {
        0 => 0,
        1..=63 => 1,
        64..=127 => 2,
        128..=195 => 3,
        196..=254 => 4,
        255 => 5,
    }
}

/// Leading digits of a file name, e.g. `"07 - Song.mp3"` -> 7.
pub fn track_number_from_name(name: &str) -> Option<u32> {
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Split tag values on `;`, trimming and dropping empty entries.
pub(crate) fn split_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_artist_tag_wins() {
        let (artists, album_artists) = resolve_artists(v(&["X"]), v(&["A"]), v(&["P"]), v(&["C"]));
        assert_eq!(artists, v(&["X"]));
        assert_eq!(album_artists, v(&["A"]));
    }

    #[test]
    fn test_empty_artist_falls_back_to_album_artist() {
        let (artists, album_artists) = resolve_artists(vec![], v(&["A"]), v(&["P"]), v(&["C"]));
        assert_eq!(artists, v(&["A"]));
        assert_eq!(album_artists, v(&["A"]));
    }

    #[test]
    fn test_empty_artists_fall_back_to_performer_and_composer() {
        let (artists, album_artists) = resolve_artists(vec![], vec![], v(&["P"]), v(&["C"]));
        assert_eq!(artists, v(&["P"]));
        assert_eq!(album_artists, v(&["C"]));
    }

    #[test]
    fn test_composer_used_when_no_performer() {
        let (artists, album_artists) = resolve_artists(vec![], vec![], vec![], v(&["C"]));
        assert_eq!(artists, v(&["C"]));
        assert_eq!(album_artists, v(&["C"]));
    }

    #[test]
    fn test_all_empty_is_unknown() {
        let (artists, album_artists) = resolve_artists(vec![], vec![], vec![], vec![]);
        assert_eq!(artists, v(&[UNKNOWN]));
        assert!(album_artists.is_empty());
    }

    #[test]
    fn test_split_values_drops_empty_strings() {
        // An empty tag value behaves like a missing tag
        assert!(split_values([""]).is_empty());
        assert_eq!(split_values(["A; B", "C"]), v(&["A", "B", "C"]));
    }

    #[test]
    fn test_resolve_title_falls_back_to_file_name() {
        let tags = TrackTags::resolve(RawTags::default(), "05 Intro.flac");
        assert_eq!(tags.title, "05 Intro.flac");
        assert_eq!(tags.track_number, 5);
        assert_eq!(tags.album_name, UNKNOWN);
        assert_eq!(tags.artists, v(&[UNKNOWN]));
        assert_eq!(tags.genres, v(&[UNKNOWN]));
    }

    #[test]
    fn test_resolve_appends_version_and_remixers() {
        let raw = RawTags {
            fields: TagFields {
                title: Some("Song".into()),
                version: Some("Live".into()),
                artists: v(&["A"]),
                remixers: v(&["R"]),
                ..Default::default()
            },
            duration_ms: 1000,
        };
        let tags = TrackTags::resolve(raw, "song.mp3");
        assert_eq!(tags.title, "Song (Live)");
        assert_eq!(tags.artists, v(&["A", "R"]));
        assert_eq!(tags.duration_ms, 1000);
    }

    #[test]
    fn test_original_year_preferred() {
        let (year, ts) = resolve_year(Some("1969"), Some("2009-09-09"));
        assert_eq!(year, Some(1969));
        assert_eq!(ts, Some(-31_536_000));
    }

    #[test]
    fn test_plain_year_fallback() {
        let (year, _) = resolve_year(None, Some("2009-09-09"));
        assert_eq!(year, Some(2009));
        let (year, ts) = resolve_year(Some("garbage"), None);
        assert_eq!((year, ts), (None, None));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("1970").unwrap(), (1970, 0));
        assert_eq!(parse_date("1970-01-02").unwrap(), (1970, 86_400));
        assert_eq!(parse_date("1970-01-02T10:00:00").unwrap(), (1970, 86_400));
        assert!(parse_date("70").is_none());
    }

    #[test]
    fn test_popm_rating_buckets() {
        assert_eq!(popm_rating(0), 0);
        assert_eq!(popm_rating(1), 1);
        assert_eq!(popm_rating(64), 2);
        assert_eq!(popm_rating(128), 3);
        assert_eq!(popm_rating(196), 4);
        assert_eq!(popm_rating(255), 5);
    }

    #[test]
    fn test_popm_used_as_rating() {
        let raw = RawTags {
            fields: TagFields {
                popularimeter: Some(255),
                ..Default::default()
            },
            duration_ms: 0,
        };
        assert_eq!(TrackTags::resolve(raw, "a.mp3").rating, 5);
    }
}
