//! Collection scanner: keeps the database in sync with the collection roots.
//!
//! A scan job walks the requested roots, extracts tags on a small pool of
//! blocking workers and reconciles the results on a single writer task:
//!
//! ```text
//! update() ──► walk ──► workers (1..=max_workers) ──mpsc──► reconcile ──► stale removal ──► finish
//! ```
//!
//! Only one job runs at a time. A new FULL or NEW_FILES request cancels the
//! running job and waits for it to stop before starting; an EXTERNAL request
//! waits for it without cancelling. Writes are committed per album, so a
//! cancelled job leaves every album it already reported intact and nothing
//! of the album it was working on.

pub mod collaborators;
mod item;
mod listener;
pub mod monitor;
pub mod reconcile;
pub mod walker;

pub use collaborators::{LogPlaylists, NoWebServices, PlaylistImporter, WebServices};
pub use item::CollectionItem;
pub use listener::{NullListener, PlayAlbum, ScanEvent, ScanListener};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{MAX_WORKERS, ScannerSettings};
use crate::db::{artists, tracks};
use crate::error::{Error, Result};
use crate::history::HistoryRecord;
use crate::metadata::{LoftyExtractor, TagExtractor, TrackTags};
use crate::model::{ScanType, ScanUpdate, StorageType};
use crate::uri;
use reconcile::{AlbumKey, Reconciler};
use walker::{Candidate, WalkOptions};

/// Delay between attempts to stop the web services.
const WEB_SERVICES_RETRY: Duration = Duration::from_millis(250);

/// Attempts before a scan request is dropped because web services won't stop.
const WEB_SERVICES_ATTEMPTS: usize = 40;

/// Extracted tags waiting for the writer.
const CHANNEL_CAPACITY: usize = 64;

/// Shared "is this job still wanted" flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn same_as(&self, other: &CancelFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Number of extraction workers: half the available cores, between 1 and
/// `max_workers` (itself capped at [`MAX_WORKERS`]).
pub fn worker_count(max_workers: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores / 2).clamp(1, max_workers.clamp(1, MAX_WORKERS))
}

struct ActiveJob {
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

struct Inner {
    pool: SqlitePool,
    settings: parking_lot::RwLock<ScannerSettings>,
    extractor: Arc<dyn TagExtractor>,
    playlists: Arc<dyn PlaylistImporter>,
    web_services: Arc<dyn WebServices>,
    listener: Arc<dyn ScanListener>,
    job: tokio::sync::Mutex<Option<ActiveJob>>,
    current: parking_lot::Mutex<Option<CancelFlag>>,
}

/// Builder for [`ScannerService`]; every collaborator has a default.
pub struct ScannerBuilder {
    pool: SqlitePool,
    settings: ScannerSettings,
    extractor: Arc<dyn TagExtractor>,
    playlists: Arc<dyn PlaylistImporter>,
    web_services: Arc<dyn WebServices>,
    listener: Arc<dyn ScanListener>,
}

impl ScannerBuilder {
    pub fn settings(mut self, settings: ScannerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TagExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn playlists(mut self, playlists: Arc<dyn PlaylistImporter>) -> Self {
        self.playlists = playlists;
        self
    }

    pub fn web_services(mut self, web_services: Arc<dyn WebServices>) -> Self {
        self.web_services = web_services;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ScanListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn build(self) -> ScannerService {
        ScannerService {
            inner: Arc::new(Inner {
                pool: self.pool,
                settings: parking_lot::RwLock::new(self.settings),
                extractor: self.extractor,
                playlists: self.playlists,
                web_services: self.web_services,
                listener: self.listener,
                job: tokio::sync::Mutex::new(None),
                current: parking_lot::Mutex::new(None),
            }),
        }
    }
}

/// Handle to the scanner. Cheap to clone; all clones share one job slot.
#[derive(Clone)]
pub struct ScannerService {
    inner: Arc<Inner>,
}

/// Progress over extraction + reconciliation (two steps per candidate).
struct Progress {
    current: AtomicUsize,
    total: usize,
    report: bool,
}

impl Progress {
    fn new(candidates: usize, report: bool) -> Self {
        Self {
            current: AtomicUsize::new(0),
            total: candidates * 2,
            report,
        }
    }

    fn advance(&self, listener: &dyn ScanListener) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        if self.report {
            listener.on_progress(current, self.total);
        }
    }

    /// Report `total` when unchanged files left steps unreported.
    fn complete(&self, listener: &dyn ScanListener) {
        let current = self.current.swap(self.total, Ordering::Relaxed);
        if self.report && current < self.total {
            listener.on_progress(self.total, self.total);
        }
    }
}

/// Tags of one file, sent from a worker to the writer.
struct Extracted {
    uri: String,
    mtime: i64,
    tags: TrackTags,
}

/// What a finished job did.
#[derive(Debug, Default)]
struct JobOutcome {
    items: Vec<CollectionItem>,
    removed: usize,
}

impl ScannerService {
    pub fn builder(pool: SqlitePool) -> ScannerBuilder {
        ScannerBuilder {
            pool,
            settings: ScannerSettings::default(),
            extractor: Arc::new(LoftyExtractor),
            playlists: Arc::new(LogPlaylists),
            web_services: Arc::new(NoWebServices),
            listener: Arc::new(NullListener),
        }
    }

    pub fn settings(&self) -> ScannerSettings {
        self.inner.settings.read().clone()
    }

    /// Replace the settings; applies to jobs started afterwards.
    pub fn set_settings(&self, settings: ScannerSettings) {
        *self.inner.settings.write() = settings;
    }

    /// Request a scan. Returns immediately; the returned handle completes
    /// once the job has been scheduled (or dropped as a no-op).
    ///
    /// `FULL` ignores `uris` and scans the configured roots.
    pub fn update(&self, scan_type: ScanType, uris: Vec<String>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.schedule(scan_type, uris).await })
    }

    /// Wait for the current job, if any, to end.
    pub async fn wait(&self) {
        let active = self.inner.job.lock().await.take();
        if let Some(active) = active {
            Self::join(active.handle).await;
        }
    }

    /// Cancel the running job. It stops at its next check point.
    pub fn stop(&self) {
        if let Some(cancel) = self.inner.current.lock().as_ref() {
            tracing::info!(target: "scanner::job", "Stop requested");
            cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.current.lock().is_some()
    }

    /// Remove the track at `uri`, optionally backing up its stats to the
    /// history store. Returns the stats the track had.
    pub async fn delete(&self, file_uri: &str, backup: bool) -> Result<HistoryRecord> {
        let mut tx = self.inner.pool.begin().await?;
        let track = tracks::get_by_uri(&mut tx, file_uri)
            .await?
            .ok_or_else(|| Error::not_found(file_uri))?;
        let removal = reconcile::remove_track(&mut tx, &track, backup).await?;
        tx.commit().await?;

        let update = if removal.album_removed {
            ScanUpdate::Removed
        } else {
            ScanUpdate::Modified
        };
        self.inner.listener.on_item_updated(&removal.item, update);
        Ok(removal.stats)
    }

    async fn join(handle: JoinHandle<()>) {
        if let Err(e) = handle.await
            && e.is_panic()
        {
            tracing::error!(target: "scanner::job", error = %e, "Scan job panicked");
        }
    }

    async fn schedule(&self, scan_type: ScanType, uris: Vec<String>) {
        let uris = match scan_type {
            ScanType::Full => self.settings().music_uris,
            ScanType::NewFiles | ScanType::External => uris,
        };
        if uris.is_empty() {
            tracing::debug!(target: "scanner::job", ?scan_type, "Nothing to scan");
            return;
        }

        let mut slot = self.inner.job.lock().await;
        if let Some(active) = slot.take() {
            if scan_type != ScanType::External {
                active.cancel.cancel();
            }
            tracing::debug!(target: "scanner::job", "Waiting for previous scan to stop");
            Self::join(active.handle).await;
        }

        if !self.stop_web_services().await {
            tracing::warn!(target: "scanner::job", ?scan_type, "Web services did not stop, scan dropped");
            return;
        }

        let cancel = CancelFlag::new();
        *self.inner.current.lock() = Some(cancel.clone());
        let this = self.clone();
        let job_cancel = cancel.clone();
        let handle = tokio::spawn(async move { this.run_job(scan_type, uris, job_cancel).await });
        *slot = Some(ActiveJob { cancel, handle });
    }

    async fn stop_web_services(&self) -> bool {
        for attempt in 0..WEB_SERVICES_ATTEMPTS {
            if self.inner.web_services.stop() {
                return true;
            }
            tracing::debug!(target: "scanner::job", attempt, "Web services busy, retrying");
            tokio::time::sleep(WEB_SERVICES_RETRY).await;
        }
        false
    }

    async fn run_job(&self, scan_type: ScanType, uris: Vec<String>, cancel: CancelFlag) {
        tracing::info!(target: "scanner::job", ?scan_type, roots = uris.len(), "Scan started");

        match self.scan(scan_type, &uris, &cancel).await {
            Ok(outcome) => self.finish(scan_type, outcome).await,
            Err(e) if e.is_cancelled() => {
                tracing::info!(target: "scanner::job", ?scan_type, "Scan cancelled");
            }
            Err(Error::MissingRoot(root)) => {
                tracing::warn!(target: "scanner::job", uri = %root, "Scan disabled, missing collection");
                self.inner.listener.on_collection_missing(&root);
                self.inner.web_services.start();
            }
            Err(e) => {
                tracing::error!(target: "scanner::job", ?scan_type, error = %e, "Scan failed");
                self.inner.web_services.start();
            }
        }

        let mut current = self.inner.current.lock();
        if current.as_ref().is_some_and(|c| c.same_as(&cancel)) {
            *current = None;
        }
    }

    async fn scan(
        &self,
        scan_type: ScanType,
        uris: &[String],
        cancel: &CancelFlag,
    ) -> Result<JobOutcome> {
        let settings = self.settings();

        let walked = {
            let roots = uris.to_vec();
            let options = WalkOptions {
                ignore_symlinks: settings.ignore_symlinks,
                import_playlists: settings.import_playlists,
            };
            let playlists = Arc::clone(&self.inner.playlists);
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                walker::walk(&roots, options, playlists.as_ref(), &cancel)
            })
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??
        };

        let (known_uris, db_mtimes) = {
            let mut conn = self.inner.pool.acquire().await?;
            let mut known = tracks::get_uris(&mut conn, StorageType::COLLECTION).await?;
            if scan_type == ScanType::NewFiles {
                known.retain(|k| uris.iter().any(|root| uri::is_under(k, root)));
            }
            (known, tracks::get_mtimes(&mut conn).await?)
        };

        let progress = Arc::new(Progress::new(
            walked.candidates.len(),
            scan_type != ScanType::External,
        ));
        let walked_uris: HashSet<String> =
            walked.candidates.iter().map(|c| c.uri.clone()).collect();
        let candidates = walked.candidates.clone();

        // After the first scan, recorded mtimes of collection files are scan times
        let stamp_now = scan_type != ScanType::External && !db_mtimes.is_empty();
        let (rx, workers) = self.spawn_workers(
            walked.candidates,
            Arc::new(db_mtimes),
            stamp_now,
            cancel,
            &progress,
            settings.max_workers,
        );
        let reconciled = self
            .reconcile(rx, scan_type, settings.show_compilations, cancel, &progress)
            .await;
        futures::future::join_all(workers.into_iter().map(Self::join)).await;
        let items = reconciled?;
        progress.complete(self.inner.listener.as_ref());

        let removed = if scan_type == ScanType::External {
            0
        } else {
            self.remove_stale(scan_type, &known_uris, &walked_uris, cancel)
                .await?
        };

        if scan_type == ScanType::External {
            self.play_external(&candidates).await?;
        }

        Ok(JobOutcome { items, removed })
    }

    fn spawn_workers(
        &self,
        candidates: Vec<Candidate>,
        db_mtimes: Arc<HashMap<String, i64>>,
        stamp_now: bool,
        cancel: &CancelFlag,
        progress: &Arc<Progress>,
        max_workers: usize,
    ) -> (mpsc::Receiver<Extracted>, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let count = worker_count(max_workers);
        let chunk_size = candidates.len().div_ceil(count).max(1);
        let now = chrono::Utc::now().timestamp();

        let mut handles = Vec::with_capacity(count);
        for chunk in candidates.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            let tx = tx.clone();
            let db_mtimes = Arc::clone(&db_mtimes);
            let cancel = cancel.clone();
            let progress = Arc::clone(progress);
            let extractor = Arc::clone(&self.inner.extractor);
            let listener = Arc::clone(&self.inner.listener);

            handles.push(tokio::task::spawn_blocking(move || {
                for candidate in chunk {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let db_mtime = db_mtimes.get(&candidate.uri).copied().unwrap_or(0);
                    if candidate.mtime > db_mtime {
                        let mtime = if stamp_now { now } else { candidate.mtime };
                        match extract(extractor.as_ref(), &candidate.uri) {
                            Ok(tags) => {
                                let sent = tx.blocking_send(Extracted {
                                    uri: candidate.uri,
                                    mtime,
                                    tags,
                                });
                                if sent.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!(target: "scanner::extract", uri = %candidate.uri, error = %e, "Cannot read tags");
                            }
                        }
                    }
                    progress.advance(listener.as_ref());
                }
            }));
        }
        tracing::debug!(target: "scanner::extract", workers = handles.len(), "Extraction started");
        (rx, handles)
    }

    /// Single writer: one transaction per album batch, one savepoint per file.
    async fn reconcile(
        &self,
        mut rx: mpsc::Receiver<Extracted>,
        scan_type: ScanType,
        show_compilations: bool,
        cancel: &CancelFlag,
        progress: &Progress,
    ) -> Result<Vec<CollectionItem>> {
        let mut reconciler = Reconciler::new(scan_type, show_compilations);
        let mut items = Vec::new();
        let mut batch: Vec<CollectionItem> = Vec::new();
        let mut batch_key: Option<AlbumKey> = None;
        let mut tx = self.inner.pool.begin().await?;

        while let Some(extracted) = rx.recv().await {
            // A cancelled job neither commits the pending album nor reports it
            cancel.check()?;
            let key = AlbumKey::of(&extracted.uri, &extracted.tags);
            if batch_key.as_ref() != Some(&key) && !batch.is_empty() {
                tx.commit().await?;
                self.notify(&batch);
                items.append(&mut batch);
                tx = self.inner.pool.begin().await?;
            }
            batch_key = Some(key);

            tracing::debug!(target: "scanner::reconcile", uri = %extracted.uri, "Adding file");
            let mut savepoint = sqlx::Connection::begin(&mut *tx).await?;
            match reconciler
                .add(&mut savepoint, &extracted.uri, extracted.mtime, &extracted.tags)
                .await
            {
                Ok(item) => {
                    savepoint.commit().await?;
                    batch.push(item);
                }
                Err(e) => {
                    tracing::error!(target: "scanner::reconcile", uri = %extracted.uri, error = %e, "Cannot add file");
                    savepoint.rollback().await?;
                }
            }
            progress.advance(self.inner.listener.as_ref());
        }

        cancel.check()?;
        tx.commit().await?;
        self.notify(&batch);
        items.append(&mut batch);
        Ok(items)
    }

    fn notify(&self, batch: &[CollectionItem]) {
        for item in batch {
            let update = if item.new_album {
                ScanUpdate::Added
            } else {
                ScanUpdate::Modified
            };
            self.inner.listener.on_item_updated(item, update);
        }
    }

    /// Delete known tracks the walk did not see, when they left the
    /// collection roots (FULL only) or their file is gone.
    async fn remove_stale(
        &self,
        scan_type: ScanType,
        known_uris: &[String],
        walked: &HashSet<String>,
        cancel: &CancelFlag,
    ) -> Result<usize> {
        let roots = (scan_type == ScanType::Full).then(|| self.settings().music_uris);
        let mut removed = 0;

        for known in known_uris.iter().filter(|u| !walked.contains(*u)) {
            cancel.check()?;
            let in_collection = roots
                .as_ref()
                .is_none_or(|roots| roots.iter().any(|root| uri::is_under(known, root)));
            if !in_collection {
                tracing::warn!(target: "scanner::reconcile", uri = %known, "Removed, not in collection anymore");
            } else if !uri::exists(known) {
                tracing::warn!(target: "scanner::reconcile", uri = %known, "Removed, file has been deleted");
            } else {
                continue;
            }

            match self.delete(known, true).await {
                Ok(_) => removed += 1,
                // Already migrated to a new location during this scan
                Err(e) if e.is_not_found() => {
                    tracing::debug!(target: "scanner::reconcile", uri = %known, "Already removed");
                }
                Err(e) => {
                    tracing::error!(target: "scanner::reconcile", uri = %known, error = %e, "Cannot remove track");
                }
            }
        }
        Ok(removed)
    }

    /// Hand the albums of an external scan to the listener for playback.
    async fn play_external(&self, candidates: &[Candidate]) -> Result<()> {
        let mut conn = self.inner.pool.acquire().await?;
        let mut albums: Vec<PlayAlbum> = Vec::new();
        for candidate in candidates {
            let Some(track) = tracks::get_by_uri(&mut conn, &candidate.uri).await? else {
                continue;
            };
            match albums.iter_mut().find(|a| a.album_id == track.album_id) {
                Some(album) => album.track_ids.push(track.id),
                None => albums.push(PlayAlbum {
                    album_id: track.album_id,
                    track_ids: vec![track.id],
                }),
            }
        }
        // Play order within each album
        for album in &mut albums {
            let ordered = tracks::get_ids_for_album(&mut conn, album.album_id).await?;
            album
                .track_ids
                .sort_by_key(|id| ordered.iter().position(|o| o == id).unwrap_or(usize::MAX));
        }
        if !albums.is_empty() {
            self.inner.listener.on_play_albums(&albums);
        }
        Ok(())
    }

    async fn finish(&self, scan_type: ScanType, outcome: JobOutcome) {
        let had_changes = !outcome.items.is_empty() || outcome.removed > 0;
        tracing::info!(
            target: "scanner::job",
            ?scan_type,
            added = outcome.items.len(),
            removed = outcome.removed,
            "Scan finished"
        );

        if scan_type != ScanType::External {
            match self.inner.pool.acquire().await {
                Ok(mut conn) => match artists::update_featuring(&mut conn).await {
                    Ok(changed) => {
                        tracing::debug!(target: "scanner::job", changed, "Featuring artists updated");
                    }
                    Err(e) => {
                        tracing::error!(target: "scanner::job", error = %e, "Cannot update featuring artists");
                    }
                },
                Err(e) => {
                    tracing::error!(target: "scanner::job", error = %e, "Cannot update featuring artists");
                }
            }
            self.inner.listener.on_scan_finished(had_changes);
        }
        self.inner.web_services.start();
    }
}

fn extract(extractor: &dyn TagExtractor, file_uri: &str) -> Result<TrackTags> {
    let path = uri::to_path(file_uri)?;
    let raw = extractor.extract(&path)?;
    Ok(TrackTags::resolve(raw, &uri::basename(file_uri)))
}
