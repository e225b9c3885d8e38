//! Scan notifications.
//!
//! The scanner reports through an injected [`ScanListener`]. Every method has
//! a no-op default so observers implement only what they need. A tokio
//! unbounded sender of [`ScanEvent`] is itself a listener, which turns the
//! callbacks into a stream for async consumers and tests.

use tokio::sync::mpsc::UnboundedSender;

use super::CollectionItem;
use crate::model::ScanUpdate;

/// Tracks of one album, in play order, ingested by an external scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayAlbum {
    pub album_id: i64,
    pub track_ids: Vec<i64>,
}

/// Observer of scan progress and collection changes.
///
/// Progress is reported from extraction worker threads as well as from the
/// writer task; implementations must be cheap and must not block.
pub trait ScanListener: Send + Sync {
    /// Combined extraction + reconciliation progress.
    fn on_progress(&self, _current: usize, _total: usize) {}

    fn on_item_updated(&self, _item: &CollectionItem, _update: ScanUpdate) {}

    /// Not called when the scan was cancelled or failed.
    fn on_scan_finished(&self, _had_changes: bool) {}

    /// A requested root does not exist; nothing was changed.
    fn on_collection_missing(&self, _uri: &str) {}

    /// An external scan finished; these albums should start playing.
    fn on_play_albums(&self, _albums: &[PlayAlbum]) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl ScanListener for NullListener {}

/// Owned form of the [`ScanListener`] callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Progress { current: usize, total: usize },
    Updated(CollectionItem, ScanUpdate),
    Finished { had_changes: bool },
    CollectionMissing(String),
    PlayAlbums(Vec<PlayAlbum>),
}

impl ScanListener for UnboundedSender<ScanEvent> {
    fn on_progress(&self, current: usize, total: usize) {
        let _ = self.send(ScanEvent::Progress { current, total });
    }

    fn on_item_updated(&self, item: &CollectionItem, update: ScanUpdate) {
        let _ = self.send(ScanEvent::Updated(item.clone(), update));
    }

    fn on_scan_finished(&self, had_changes: bool) {
        let _ = self.send(ScanEvent::Finished { had_changes });
    }

    fn on_collection_missing(&self, uri: &str) {
        let _ = self.send(ScanEvent::CollectionMissing(uri.to_string()));
    }

    fn on_play_albums(&self, albums: &[PlayAlbum]) {
        let _ = self.send(ScanEvent::PlayAlbums(albums.to_vec()));
    }
}
