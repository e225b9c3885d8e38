//! Services the scanner drives but does not own.

/// Receives playlist files found while walking the collection.
///
/// Fire-and-forget: the scanner neither waits on nor inspects the import.
pub trait PlaylistImporter: Send + Sync {
    fn import(&self, uri: &str);
}

/// Playlist importer that only logs what it was given.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPlaylists;

impl PlaylistImporter for LogPlaylists {
    fn import(&self, uri: &str) {
        tracing::info!(target: "scanner::walk", uri = %uri, "Playlist found, no importer configured");
    }
}

/// Background web services (art downloads, directory sync) that must be
/// quiet while the collection database is rewritten.
pub trait WebServices: Send + Sync {
    /// Ask the services to stop. Returns false if they cannot stop yet;
    /// the scanner retries shortly after.
    fn stop(&self) -> bool;

    /// Resume after a collection scan.
    fn start(&self);
}

/// No web services configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWebServices;

impl WebServices for NoWebServices {
    fn stop(&self) -> bool {
        true
    }

    fn start(&self) {}
}
