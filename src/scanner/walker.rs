//! Filesystem walk: collect audio candidates under the requested roots.
//!
//! Breadth-first over `std::fs::read_dir`, single-threaded. Hidden entries
//! are skipped, symlinks optionally, and every directory is visited once
//! even when symlinks form a cycle. Files are classified by content first
//! (`infer`), then by extension; playlists go to the importer instead of
//! the candidate list.

use std::collections::{HashSet, VecDeque};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::CancelFlag;
use super::collaborators::PlaylistImporter;
use crate::error::{Error, Result};
use crate::uri;

const PLAYLIST_EXTENSIONS: &[&str] = &["m3u", "m3u8", "pls", "xspf", "wpl"];

const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "wav", "m4a", "aac", "wma", "ape", "wv", "mpc", "aiff",
    "aif", "dsf",
];

/// Walk policies taken from the settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    pub ignore_symlinks: bool,
    pub import_playlists: bool,
}

/// An audio file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Modification time (unix seconds)
    pub mtime: i64,
    pub uri: String,
}

#[derive(Debug, Default)]
pub struct WalkResult {
    /// Sorted by mtime, most recent first
    pub candidates: Vec<Candidate>,
    pub directories: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Audio,
    Playlist,
    Other,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn classify(path: &Path) -> FileKind {
    let ext = extension(path);
    if ext.as_deref().is_some_and(|e| PLAYLIST_EXTENSIONS.contains(&e)) {
        return FileKind::Playlist;
    }
    if let Ok(Some(kind)) = infer::get_from_path(path)
        && kind.matcher_type() == infer::MatcherType::Audio
    {
        return FileKind::Audio;
    }
    if ext.as_deref().is_some_and(|e| AUDIO_EXTENSIONS.contains(&e)) {
        FileKind::Audio
    } else {
        FileKind::Other
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn mtime_of(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Enumerate audio files under `roots` (`file://` URIs of directories or files).
///
/// Fails with [`Error::MissingRoot`] before touching anything if a root does
/// not exist, and with [`Error::Cancelled`] as soon as `cancel` is set.
/// Unreadable entries are logged and skipped.
pub fn walk(
    roots: &[String],
    options: WalkOptions,
    playlists: &dyn PlaylistImporter,
    cancel: &CancelFlag,
) -> Result<WalkResult> {
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    for root in roots {
        match uri::to_path(root) {
            Ok(path) if path.exists() => queue.push_back(path),
            _ => return Err(Error::MissingRoot(root.clone())),
        }
    }

    let mut result = WalkResult::default();
    let mut visited: HashSet<PathBuf> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        cancel.check()?;

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(target: "scanner::walk", path = %path.display(), error = %e, "Cannot stat entry");
                continue;
            }
        };

        if metadata.is_dir() {
            let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !visited.insert(canonical) {
                continue;
            }
            if let Ok(dir_uri) = uri::from_path(&path) {
                result.directories.push(dir_uri);
            }
            let entries = match std::fs::read_dir(&path) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(target: "scanner::walk", path = %path.display(), error = %e, "Cannot read directory");
                    continue;
                }
            };
            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(target: "scanner::walk", path = %path.display(), error = %e, "Cannot read directory entry");
                        continue;
                    }
                };
                let child = entry.path();
                if is_hidden(&child) {
                    continue;
                }
                if options.ignore_symlinks
                    && entry.file_type().map(|t| t.is_symlink()).unwrap_or(false)
                {
                    tracing::debug!(target: "scanner::walk", path = %child.display(), "Skipping symlink");
                    continue;
                }
                queue.push_back(child);
            }
            continue;
        }

        if metadata.len() == 0 {
            tracing::debug!(target: "scanner::walk", path = %path.display(), "Skipping empty file");
            continue;
        }

        let Ok(file_uri) = uri::from_path(&path) else {
            tracing::warn!(target: "scanner::walk", path = %path.display(), "Cannot build URI");
            continue;
        };
        match classify(&path) {
            FileKind::Audio => result.candidates.push(Candidate {
                mtime: mtime_of(&metadata),
                uri: file_uri,
            }),
            FileKind::Playlist => {
                if options.import_playlists {
                    playlists.import(&file_uri);
                }
            }
            FileKind::Other => {
                tracing::debug!(target: "scanner::walk", uri = %file_uri, "Not detected as a music file");
            }
        }
    }

    result
        .candidates
        .sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.uri.cmp(&b.uri)));

    tracing::debug!(
        target: "scanner::walk",
        files = result.candidates.len(),
        dirs = result.directories.len(),
        "Walk complete"
    );
    Ok(result)
}
