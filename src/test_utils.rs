//! Test utilities and fixtures for collection-scanner tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{temp_db, FakeExtractor, raw_tags};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (pool, _dir) = temp_db().await;
//!     let extractor = FakeExtractor::default().with("1.mp3", raw_tags("One", "A", "Album"));
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::error::{Error, Result};
use crate::metadata::{RawTags, TagExtractor, TagFields};
use crate::scanner::ScanEvent;

/// Creates a temporary database for testing.
///
/// Keep the returned `TempDir` alive for the duration of the test; the
/// database is deleted when it goes out of scope.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Writes a small non-empty placeholder file (creating parent directories)
/// and sets its modification time to `mtime_secs` after the epoch.
pub fn write_file(path: &Path, mtime_secs: u64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directories");
    }
    let file = std::fs::File::create(path).expect("Failed to create file");
    (&file)
        .write_all(b"placeholder audio content")
        .expect("Failed to write file");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(mtime_secs))
        .expect("Failed to set mtime");
}

/// Writes a silent 8 kHz mono 16-bit PCM WAV file of `duration_ms`.
pub fn write_wav(path: &Path, duration_ms: u32) {
    const SAMPLE_RATE: u32 = 8_000;
    let samples = SAMPLE_RATE * duration_ms / 1000;
    let data_len = samples * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(44 + data_len as usize, 0);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create directories");
    }
    std::fs::write(path, bytes).expect("Failed to write wav");
}

/// Tags for a single-artist track of 180 s.
pub fn raw_tags(title: &str, artist: &str, album: &str) -> RawTags {
    RawTags {
        fields: TagFields {
            title: Some(title.to_string()),
            artists: vec![artist.to_string()],
            album: Some(album.to_string()),
            genres: vec!["Rock".to_string()],
            date: Some("2001".to_string()),
            ..Default::default()
        },
        duration_ms: 180_000,
    }
}

/// Extractor returning canned tags keyed by file name.
///
/// Files without an entry fail like unreadable audio would.
#[derive(Debug, Default, Clone)]
pub struct FakeExtractor {
    tags: HashMap<String, RawTags>,
}

impl FakeExtractor {
    pub fn with(mut self, file_name: &str, tags: RawTags) -> Self {
        self.tags.insert(file_name.to_string(), tags);
        self
    }
}

impl TagExtractor for FakeExtractor {
    fn extract(&self, path: &Path) -> Result<RawTags> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.tags
            .get(name)
            .cloned()
            .ok_or_else(|| Error::metadata(path, "no fake tags"))
    }
}

/// Channel-backed listener; the receiver collects every notification.
pub fn recording_listener() -> (UnboundedSender<ScanEvent>, UnboundedReceiver<ScanEvent>) {
    unbounded_channel()
}

/// Drains the events received so far.
pub fn drain(rx: &mut UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let tracks = crate::db::tracks::get_all(&mut conn).await.unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_write_file_sets_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.mp3");
        write_file(&path, 1_234);

        let meta = std::fs::metadata(&path).unwrap();
        assert!(meta.len() > 0);
        let mtime = meta.modified().unwrap().duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(mtime.as_secs(), 1_234);
    }

    #[test]
    fn test_fake_extractor() {
        let extractor = FakeExtractor::default().with("1.mp3", raw_tags("One", "A", "Album"));
        let tags = extractor.extract(Path::new("/m/1.mp3")).unwrap();
        assert_eq!(tags.fields.title.as_deref(), Some("One"));
        assert!(extractor.extract(Path::new("/m/2.mp3")).is_err());
    }
}
