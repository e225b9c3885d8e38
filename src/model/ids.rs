//! Deterministic content ids for albums and tracks.
//!
//! These are natural keys independent of the database rowid: re-ingesting
//! identical tags always yields the same id, which makes upserts idempotent.

use sha2::{Digest, Sha256};

// Unit separator between fields; cannot appear in tag text we keep.
const SEP: [u8; 1] = [0x1f];

fn hash_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(SEP);
    }
    format!("{:x}", hasher.finalize())
}

fn year_field(year: Option<i32>) -> String {
    year.map(|y| y.to_string()).unwrap_or_default()
}

/// Content id of an album: name, album artists and year.
pub fn lp_album_id_of(name: &str, artists: &[String], year: Option<i32>) -> String {
    let artists = artists.join(";");
    let year = year_field(year);
    hash_fields(["album", name, artists.as_str(), year.as_str()])
}

/// Content id of a track: name, artists, year and album name.
pub fn lp_track_id_of(name: &str, artists: &[String], year: Option<i32>, album: &str) -> String {
    let artists = artists.join(";");
    let year = year_field(year);
    hash_fields(["track", name, artists.as_str(), year.as_str(), album])
}
