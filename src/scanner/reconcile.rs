//! Database reconciliation: turn resolved tags into rows, and remove tracks
//! with full cleanup.
//!
//! Everything here runs on the scanner's single writer, on a connection the
//! caller scopes (usually a savepoint inside the per-album transaction).

use sqlx::SqliteConnection;

use super::CollectionItem;
use crate::db::albums::{self, NewAlbum};
use crate::db::tracks::{self, NewTrack};
use crate::db::{artists, genres};
use crate::error::Result;
use crate::history::{self, HistoryRecord};
use crate::metadata::TrackTags;
use crate::model::{ScanType, StorageType, Track, lp_album_id_of, lp_track_id_of};
use crate::uri;

/// Identity of the album a file will land in, known before any write.
///
/// Albums without album artists are scoped to their directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumKey {
    lp_album_id: String,
    dir: Option<String>,
}

impl AlbumKey {
    pub fn of(file_uri: &str, tags: &TrackTags) -> Self {
        Self {
            lp_album_id: lp_album_id_of(&tags.album_name, &tags.album_artists, tags.year),
            dir: tags
                .album_artists
                .is_empty()
                .then(|| album_uri(file_uri)),
        }
    }
}

fn album_uri(file_uri: &str) -> String {
    uri::parent(file_uri).unwrap_or_else(|| file_uri.to_string())
}

/// Result of removing a track.
#[derive(Debug, Clone)]
pub struct Removal {
    /// Statistics of the track and its album before removal
    pub stats: HistoryRecord,
    /// Album id, plus the artists and genres deleted by cleanup
    pub item: CollectionItem,
    /// The album lost its last track and was deleted
    pub album_removed: bool,
}

/// Remove a track, optionally backing up its stats to the history store,
/// then clean up its album, artists and genres.
pub async fn remove_track(
    conn: &mut SqliteConnection,
    track: &Track,
    backup: bool,
) -> Result<Removal> {
    let album = albums::get(conn, track.album_id).await?;
    let album_artist_ids = albums::get_artist_ids(conn, track.album_id).await?;
    let album_genre_ids = albums::get_genre_ids(conn, track.album_id).await?;
    let artist_ids = tracks::get_artist_ids(conn, track.id).await?;
    let genre_ids = tracks::get_genre_ids(conn, track.id).await?;

    let stats = HistoryRecord {
        popularity: track.popularity,
        rate: track.rate,
        ltime: track.ltime,
        mtime: album.as_ref().map(|a| a.mtime).unwrap_or(track.mtime),
        loved: track.loved,
        album_loved: album.as_ref().map(|a| a.loved).unwrap_or(0),
        album_popularity: album.as_ref().map(|a| a.popularity).unwrap_or(0),
        album_rate: album.as_ref().map(|a| a.rate).unwrap_or(0),
        album_synced: album.as_ref().map(|a| a.synced).unwrap_or(0),
    };

    if backup {
        history::record(conn, &uri::basename(&track.uri), track.duration, &stats).await?;
    }

    tracks::remove(conn, track.id).await?;

    let remaining_genres = tracks::get_genre_ids_for_album(conn, track.album_id).await?;
    albums::set_genre_ids(conn, track.album_id, &remaining_genres).await?;
    let album_removed = albums::clean(conn, track.album_id).await?;
    if !album_removed {
        let (year, timestamp) = tracks::get_year_for_album(conn, track.album_id).await?;
        albums::set_year(conn, track.album_id, year, timestamp).await?;
    }

    let mut item = CollectionItem::for_album(track.album_id);
    if let Some(album) = &album {
        item.album_name = album.name.clone();
    }
    let mut candidates = album_artist_ids;
    candidates.extend(artist_ids);
    candidates.dedup();
    for artist_id in candidates {
        if !item.artist_ids.contains(&artist_id) && artists::clean(conn, artist_id).await? {
            item.artist_ids.push(artist_id);
        }
    }
    let mut genre_candidates = album_genre_ids;
    genre_candidates.extend(genre_ids);
    for genre_id in genre_candidates {
        if !item.genre_ids.contains(&genre_id) && genres::clean(conn, genre_id).await? {
            item.genre_ids.push(genre_id);
        }
    }

    tracing::debug!(
        target: "scanner::reconcile",
        uri = %track.uri,
        backup,
        album_removed,
        "Track removed"
    );
    Ok(Removal {
        stats,
        item,
        album_removed,
    })
}

/// Writes files of one scan job into the database.
///
/// Holds the job's accumulator of artists created by track tags but not yet
/// attributed to an album, so the album that finally claims them reports
/// them as new.
#[derive(Debug)]
pub struct Reconciler {
    storage_type: StorageType,
    disable_compilations: bool,
    pending_new_artist_ids: Vec<i64>,
}

impl Reconciler {
    pub fn new(scan_type: ScanType, show_compilations: bool) -> Self {
        Self {
            storage_type: scan_type.storage_type(),
            disable_compilations: !show_compilations,
            pending_new_artist_ids: Vec::new(),
        }
    }

    /// Add (or re-add) one file.
    pub async fn add(
        &mut self,
        conn: &mut SqliteConnection,
        file_uri: &str,
        mtime: i64,
        tags: &TrackTags,
    ) -> Result<CollectionItem> {
        let basename = uri::basename(file_uri);
        let stats = restore_stats(conn, file_uri, &basename, tags.duration_ms).await?;
        let rate = if stats.rate == 0 { tags.rating } else { stats.rate };
        let album_mtime = if stats.mtime == 0 { mtime } else { stats.mtime };

        let mut item = CollectionItem::new(&tags.album_name, tags.year, tags.timestamp);

        // Album
        let (album_artist_ids, mut new_album_artist_ids) = add_artists(
            conn,
            &tags.album_artists,
            &tags.album_artist_sortnames,
            &tags.mb_album_artist_ids,
        )
        .await?;
        for artist_id in &album_artist_ids {
            if self.claim_pending(*artist_id) {
                new_album_artist_ids.push(*artist_id);
            }
        }
        item.album_artist_ids = album_artist_ids.clone();
        item.new_album_artist_ids = new_album_artist_ids;

        let lp_album_id = lp_album_id_of(&tags.album_name, &tags.album_artists, tags.year);
        let dir = album_uri(file_uri);
        let scoped_dir = album_artist_ids.is_empty().then_some(dir.as_str());
        let (new_album, album_id) = match albums::get_id(conn, &lp_album_id, scoped_dir).await? {
            Some(id) => (false, id),
            None => {
                let id = albums::add(
                    conn,
                    &NewAlbum {
                        name: &tags.album_name,
                        mb_album_id: &tags.mb_album_id,
                        lp_album_id: &lp_album_id,
                        uri: &dir,
                        loved: stats.album_loved,
                        popularity: stats.album_popularity,
                        rate: stats.album_rate,
                        synced: stats.album_synced,
                        mtime: album_mtime,
                        storage_type: self.storage_type.to_db(),
                    },
                )
                .await?;
                (true, id)
            }
        };
        item.album_id = album_id;
        item.new_album = new_album;

        // Track
        let (artist_ids, new_artist_ids) =
            add_artists(conn, &tags.artists, &tags.artist_sortnames, &tags.mb_artist_ids).await?;
        for artist_id in &new_artist_ids {
            if !self.pending_new_artist_ids.contains(artist_id) {
                self.pending_new_artist_ids.push(*artist_id);
            }
        }
        let mut linked_artist_ids = artist_ids.clone();
        // Broken tags: none of the album artists credited on the track
        if !album_artist_ids.is_empty() && album_artist_ids.iter().all(|id| !artist_ids.contains(id))
        {
            linked_artist_ids.extend(&album_artist_ids);
        }
        item.artist_ids = artist_ids;
        item.new_artist_ids = new_artist_ids;

        let (genre_ids, new_genre_ids) = add_genres(conn, &tags.genres).await?;
        item.genre_ids = genre_ids.clone();
        item.new_genre_ids = new_genre_ids;

        let lp_track_id =
            lp_track_id_of(&tags.title, &tags.artists, tags.year, &tags.album_name);
        let track_id = tracks::add(
            conn,
            &NewTrack {
                name: &tags.title,
                uri: file_uri,
                duration: tags.duration_ms,
                tracknumber: i64::from(tags.track_number),
                discnumber: i64::from(tags.disc_number),
                discname: &tags.disc_name,
                album_id,
                year: tags.year.map(i64::from),
                timestamp: tags.timestamp,
                popularity: stats.popularity,
                rate,
                loved: stats.loved,
                ltime: stats.ltime,
                mtime,
                mb_track_id: &tags.mb_track_id,
                lp_track_id: &lp_track_id,
                bpm: tags.bpm,
                storage_type: self.storage_type.to_db(),
            },
        )
        .await?;
        for (position, artist_id) in linked_artist_ids.iter().enumerate() {
            tracks::add_artist(conn, track_id, *artist_id, position).await?;
        }
        for genre_id in &genre_ids {
            tracks::add_genre(conn, track_id, *genre_id).await?;
        }
        item.track_id = track_id;

        // Album aggregates
        if album_artist_ids.is_empty() {
            let calculated =
                albums::calculate_artist_ids(conn, album_id, self.disable_compilations).await?;
            albums::set_artist_ids(conn, album_id, &calculated).await?;
            item.new_album_artist_ids = calculated
                .iter()
                .copied()
                .filter(|id| self.claim_pending(*id))
                .collect();
            item.album_artist_ids = calculated;
        } else {
            albums::set_artist_ids(conn, album_id, &album_artist_ids).await?;
        }
        for genre_id in &genre_ids {
            albums::add_genre(conn, album_id, *genre_id).await?;
        }
        let (year, timestamp) = tracks::get_year_for_album(conn, album_id).await?;
        albums::set_year(conn, album_id, year, timestamp).await?;

        tracing::debug!(
            target: "scanner::reconcile",
            uri = %file_uri,
            track_id,
            album_id,
            new_album,
            "Track added"
        );
        Ok(item)
    }

    fn claim_pending(&mut self, artist_id: i64) -> bool {
        match self.pending_new_artist_ids.iter().position(|id| *id == artist_id) {
            Some(pos) => {
                self.pending_new_artist_ids.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// Statistics the new row should start from.
///
/// An existing row for the URI, or a row for a vanished file with the same
/// name and duration (a move), is removed and its stats carried over.
/// Otherwise the history store is consulted and its record consumed.
async fn restore_stats(
    conn: &mut SqliteConnection,
    file_uri: &str,
    basename: &str,
    duration: i64,
) -> Result<HistoryRecord> {
    if let Some(track) = tracks::get_by_uri(conn, file_uri).await? {
        return Ok(remove_track(conn, &track, false).await?.stats);
    }

    let moved = tracks::get_by_basename_duration(conn, basename, duration)
        .await?
        .into_iter()
        .find(|t| !uri::exists(&t.uri));
    if let Some(track) = moved {
        tracing::info!(
            target: "scanner::reconcile",
            from = %track.uri,
            to = %file_uri,
            "Migrating stats of moved file"
        );
        return Ok(remove_track(conn, &track, false).await?.stats);
    }

    let stats = history::lookup(conn, basename, duration).await?;
    if stats != HistoryRecord::default() {
        history::remove(conn, basename, duration).await?;
    }
    Ok(stats)
}

/// Resolve artist names to ids, creating missing ones.
///
/// Returns `(all ids in tag order, ids created now)`.
async fn add_artists(
    conn: &mut SqliteConnection,
    names: &[String],
    sortnames: &[String],
    mb_artist_ids: &[String],
) -> Result<(Vec<i64>, Vec<i64>)> {
    let mut ids = Vec::with_capacity(names.len());
    let mut new_ids = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let sortname = sortnames.get(i).map(String::as_str).unwrap_or("");
        let mb_artist_id = mb_artist_ids.get(i).map(String::as_str).unwrap_or("");
        let id = match artists::get_id(conn, name).await? {
            Some(id) => {
                artists::fill_missing(conn, id, sortname, mb_artist_id).await?;
                id
            }
            None => {
                let id = artists::add(conn, name, sortname, mb_artist_id).await?;
                new_ids.push(id);
                id
            }
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok((ids, new_ids))
}

/// Resolve genre names to ids, creating missing ones.
async fn add_genres(conn: &mut SqliteConnection, names: &[String]) -> Result<(Vec<i64>, Vec<i64>)> {
    let mut ids = Vec::with_capacity(names.len());
    let mut new_ids = Vec::new();
    for name in names {
        let id = match genres::get_id(conn, name).await? {
            Some(id) => id,
            None => {
                let id = genres::add(conn, name).await?;
                new_ids.push(id);
                id
            }
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok((ids, new_ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{RawTags, TagFields};
    use crate::model::COMPILATIONS_ARTIST_ID;
    use crate::test_utils::temp_db;

    fn tags(title: &str, artists: &[&str], album_artists: &[&str]) -> TrackTags {
        TrackTags::resolve(
            RawTags {
                fields: TagFields {
                    title: Some(title.to_string()),
                    artists: artists.iter().map(|s| s.to_string()).collect(),
                    album_artists: album_artists.iter().map(|s| s.to_string()).collect(),
                    album: Some("Album".to_string()),
                    genres: vec!["Rock".to_string()],
                    date: Some("2001".to_string()),
                    ..Default::default()
                },
                duration_ms: 180_000,
            },
            "file.mp3",
        )
    }

    #[tokio::test]
    async fn test_add_creates_rows_and_links() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let item = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 100, &tags("One", &["A"], &["A"]))
            .await
            .unwrap();

        assert!(item.new_album);
        assert_eq!(item.new_artist_ids, Vec::<i64>::new());
        assert_eq!(item.new_album_artist_ids, item.album_artist_ids);
        assert_eq!(item.new_genre_ids.len(), 1);

        let album = albums::get(&mut conn, item.album_id).await.unwrap().unwrap();
        assert_eq!(album.uri, "file:///m/a");
        assert_eq!(album.year, Some(2001));
        assert_eq!(album.mtime, 100);
        assert_eq!(album.storage_type, StorageType::COLLECTION.to_db());

        let track = tracks::get(&mut conn, item.track_id).await.unwrap().unwrap();
        assert_eq!(track.name, "One");
        assert_eq!(track.duration, 180_000);
        assert_eq!(
            tracks::get_artist_ids(&mut conn, item.track_id).await.unwrap(),
            item.artist_ids
        );
    }

    #[tokio::test]
    async fn test_second_track_joins_album() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let first = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 100, &tags("One", &["A"], &["A"]))
            .await
            .unwrap();
        let second = reconciler
            .add(&mut conn, "file:///m/a/2.mp3", 100, &tags("Two", &["A"], &["A"]))
            .await
            .unwrap();

        assert_eq!(first.album_id, second.album_id);
        assert!(!second.new_album);
        assert!(second.new_artist_ids.is_empty());
    }

    #[tokio::test]
    async fn test_album_artists_added_when_track_lacks_them() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let item = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 100, &tags("One", &["Guest"], &["Band"]))
            .await
            .unwrap();
        let linked = tracks::get_artist_ids(&mut conn, item.track_id).await.unwrap();
        assert_eq!(linked.len(), 2);
        assert!(linked.contains(&item.album_artist_ids[0]));
    }

    #[tokio::test]
    async fn test_compilation_in_one_directory() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let first = reconciler
            .add(&mut conn, "file:///m/v/1.mp3", 100, &tags("One", &["A"], &[]))
            .await
            .unwrap();
        // A freshly created track artist becomes a new album artist
        assert_eq!(first.new_album_artist_ids, first.artist_ids);

        let second = reconciler
            .add(&mut conn, "file:///m/v/2.mp3", 100, &tags("Two", &["B"], &[]))
            .await
            .unwrap();

        assert_eq!(first.album_id, second.album_id);
        assert_eq!(
            albums::get_artist_ids(&mut conn, first.album_id).await.unwrap(),
            vec![COMPILATIONS_ARTIST_ID]
        );

        // Same tags in another directory is another album
        let other = reconciler
            .add(&mut conn, "file:///m/w/1.mp3", 100, &tags("One", &["A"], &[]))
            .await
            .unwrap();
        assert_ne!(other.album_id, first.album_id);
    }

    #[tokio::test]
    async fn test_remove_track_cleans_up_and_backs_up() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let item = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 100, &tags("One", &["A"], &["A"]))
            .await
            .unwrap();
        sqlx::query("UPDATE tracks SET popularity = 5 WHERE id = ?")
            .bind(item.track_id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let track = tracks::get(&mut conn, item.track_id).await.unwrap().unwrap();
        let removal = remove_track(&mut conn, &track, true).await.unwrap();

        assert!(removal.album_removed);
        assert_eq!(removal.stats.popularity, 5);
        assert_eq!(removal.item.artist_ids, item.album_artist_ids);
        assert_eq!(removal.item.genre_ids, item.genre_ids);
        assert!(albums::get(&mut conn, item.album_id).await.unwrap().is_none());
        assert_eq!(
            history::lookup(&mut conn, "1.mp3", 180_000).await.unwrap().popularity,
            5
        );
    }

    #[tokio::test]
    async fn test_readd_consumes_history() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let stats = HistoryRecord {
            popularity: 5,
            rate: 4,
            album_loved: 1,
            ..Default::default()
        };
        history::record(&mut conn, "1.mp3", 180_000, &stats).await.unwrap();

        let item = reconciler
            .add(&mut conn, "file:///elsewhere/1.mp3", 100, &tags("One", &["A"], &["A"]))
            .await
            .unwrap();
        let track = tracks::get(&mut conn, item.track_id).await.unwrap().unwrap();
        assert_eq!(track.popularity, 5);
        assert_eq!(track.rate, 4);
        assert_eq!(albums::get(&mut conn, item.album_id).await.unwrap().unwrap().loved, 1);
        assert!(history::get(&mut conn, "1.mp3", 180_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_readd_same_uri_keeps_stats() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();
        let mut reconciler = Reconciler::new(ScanType::Full, true);

        let first = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 100, &tags("One", &["A"], &["A"]))
            .await
            .unwrap();
        sqlx::query("UPDATE tracks SET loved = 1 WHERE id = ?")
            .bind(first.track_id)
            .execute(&mut *conn)
            .await
            .unwrap();

        let second = reconciler
            .add(&mut conn, "file:///m/a/1.mp3", 200, &tags("One (edit)", &["A"], &["A"]))
            .await
            .unwrap();
        let track = tracks::get_by_uri(&mut conn, "file:///m/a/1.mp3").await.unwrap().unwrap();
        assert_eq!(track.id, second.track_id);
        assert_eq!(track.name, "One (edit)");
        assert_eq!(track.loved, 1);
        assert_eq!(track.mtime, 200);
    }
}
