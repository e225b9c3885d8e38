//! Track rows and their artist/genre links.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use crate::model::{StorageType, Track};

const TRACK_COLUMNS: &str = "id, name, uri, duration, tracknumber, discnumber, discname, \
     album_id, year, timestamp, popularity, rate, loved, ltime, mtime, mb_track_id, \
     lp_track_id, bpm, storage_type";

/// Fields of a new track row.
#[derive(Debug, Clone, Default)]
pub struct NewTrack<'a> {
    pub name: &'a str,
    pub uri: &'a str,
    pub duration: i64,
    pub tracknumber: i64,
    pub discnumber: i64,
    pub discname: &'a str,
    pub album_id: i64,
    pub year: Option<i64>,
    pub timestamp: Option<i64>,
    pub popularity: i64,
    pub rate: i64,
    pub loved: i64,
    pub ltime: i64,
    pub mtime: i64,
    pub mb_track_id: &'a str,
    pub lp_track_id: &'a str,
    pub bpm: f64,
    pub storage_type: i64,
}

/// Insert a track row.
///
/// Artist and genre links are added separately with [`add_artist`] and
/// [`add_genre`].
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `track` - Column values of the new row
///
/// # Returns
///
/// The id of the inserted track.
///
/// # Errors
///
/// Fails if the URI is already stored (unique constraint) or the insert
/// cannot be executed.
pub async fn add(conn: &mut SqliteConnection, track: &NewTrack<'_>) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO tracks (name, uri, duration, tracknumber, discnumber, discname,
                            album_id, year, timestamp, popularity, rate, loved, ltime,
                            mtime, mb_track_id, lp_track_id, bpm, storage_type)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track.name)
    .bind(track.uri)
    .bind(track.duration)
    .bind(track.tracknumber)
    .bind(track.discnumber)
    .bind(track.discname)
    .bind(track.album_id)
    .bind(track.year)
    .bind(track.timestamp)
    .bind(track.popularity)
    .bind(track.rate)
    .bind(track.loved)
    .bind(track.ltime)
    .bind(track.mtime)
    .bind(track.mb_track_id)
    .bind(track.lp_track_id)
    .bind(track.bpm)
    .bind(track.storage_type)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Link an artist to the track at `position` (0 = first credited).
pub async fn add_artist(
    conn: &mut SqliteConnection,
    track_id: i64,
    artist_id: i64,
    position: usize,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO track_artists (track_id, artist_id, position) VALUES (?, ?, ?)",
    )
    .bind(track_id)
    .bind(artist_id)
    .bind(position as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn add_genre(conn: &mut SqliteConnection, track_id: i64, genre_id: i64) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO track_genres (track_id, genre_id) VALUES (?, ?)")
        .bind(track_id)
        .bind(genre_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Look up a track by its `file://` URI.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `uri` - Exact URI as stored by the scanner
///
/// # Returns
///
/// The track, or `None` if no row has this URI.
pub async fn get_by_uri(conn: &mut SqliteConnection, uri: &str) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(&format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE uri = ?"))
        .bind(uri)
        .fetch_optional(&mut *conn)
        .await
}

/// Id of the track with this content hash.
pub async fn get_id_by_lp_track_id(
    conn: &mut SqliteConnection,
    lp_track_id: &str,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM tracks WHERE lp_track_id = ? LIMIT 1")
        .bind(lp_track_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Tracks with this duration whose file name is `basename`.
///
/// Used to find the previous location of a moved file.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `basename` - Percent-decoded file name (e.g. "01 Intro.mp3")
/// * `duration` - Duration in milliseconds
///
/// # Returns
///
/// Matching tracks in id order; empty when none match.
pub async fn get_by_basename_duration(
    conn: &mut SqliteConnection,
    basename: &str,
    duration: i64,
) -> sqlx::Result<Vec<Track>> {
    let tracks = sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks WHERE duration = ? ORDER BY id"
    ))
    .bind(duration)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tracks
        .into_iter()
        .filter(|t| crate::uri::basename(&t.uri) == basename)
        .collect())
}

pub async fn get_artist_ids(conn: &mut SqliteConnection, track_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT artist_id FROM track_artists WHERE track_id = ? ORDER BY position, artist_id",
    )
    .bind(track_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn get_genre_ids(conn: &mut SqliteConnection, track_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar("SELECT genre_id FROM track_genres WHERE track_id = ? ORDER BY genre_id")
        .bind(track_id)
        .fetch_all(&mut *conn)
        .await
}

/// Distinct genres of the album's remaining tracks.
pub async fn get_genre_ids_for_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT tg.genre_id
        FROM track_genres tg JOIN tracks t ON t.id = tg.track_id
        WHERE t.album_id = ?
        ORDER BY tg.genre_id
        "#,
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await
}

/// Track ids of an album in disc/track order.
pub async fn get_ids_for_album(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT id FROM tracks WHERE album_id = ? ORDER BY discnumber, tracknumber, id",
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await
}

/// Most common year among the album's tracks (earliest on ties) and the
/// earliest timestamp.
pub async fn get_year_for_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> sqlx::Result<(Option<i64>, Option<i64>)> {
    let year: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT year FROM tracks
        WHERE album_id = ? AND year IS NOT NULL
        GROUP BY year
        ORDER BY COUNT(*) DESC, year ASC
        LIMIT 1
        "#,
    )
    .bind(album_id)
    .fetch_optional(&mut *conn)
    .await?;
    let timestamp: Option<i64> =
        sqlx::query_scalar("SELECT MIN(timestamp) FROM tracks WHERE album_id = ?")
            .bind(album_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok((year, timestamp))
}

/// URIs of every track whose storage type intersects `storage`.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `storage` - Storage flags to match, e.g. [`StorageType::COLLECTION`]
///
/// # Returns
///
/// URIs in lexical order.
pub async fn get_uris(conn: &mut SqliteConnection, storage: StorageType) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar("SELECT uri FROM tracks WHERE (storage_type & ?) != 0 ORDER BY uri")
        .bind(storage.to_db())
        .fetch_all(&mut *conn)
        .await
}

/// Recorded mtime per URI.
///
/// # Returns
///
/// A map from track URI to the mtime stored at its last reconciliation,
/// covering every storage type.
pub async fn get_mtimes(conn: &mut SqliteConnection) -> sqlx::Result<HashMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as("SELECT uri, mtime FROM tracks")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}

pub async fn get_all(conn: &mut SqliteConnection) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(&format!(
        "SELECT {TRACK_COLUMNS} FROM tracks ORDER BY album_id, discnumber, tracknumber"
    ))
    .fetch_all(&mut *conn)
    .await
}

/// Delete the track and its artist/genre links.
///
/// Albums, artists and genres left without references are not touched; the
/// caller cleans them up.
///
/// # Errors
///
/// Returns an error if any of the deletes fails. Inside a transaction the
/// caller's rollback undoes the partial removal.
pub async fn remove(conn: &mut SqliteConnection, track_id: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM track_artists WHERE track_id = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM track_genres WHERE track_id = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM tracks WHERE id = ?")
        .bind(track_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    fn new_track<'a>(uri: &'a str, album_id: i64) -> NewTrack<'a> {
        NewTrack {
            name: "Song",
            uri,
            duration: 180_000,
            album_id,
            lp_track_id: "hash",
            storage_type: StorageType::COLLECTION.to_db(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = add(&mut conn, &NewTrack { tracknumber: 3, ..new_track("file:///m/a.mp3", 1) })
            .await
            .unwrap();
        let track = get_by_uri(&mut conn, "file:///m/a.mp3").await.unwrap().unwrap();
        assert_eq!(track.id, id);
        assert_eq!(track.tracknumber, 3);
        assert_eq!(get(&mut conn, id).await.unwrap().unwrap().uri, "file:///m/a.mp3");
    }

    #[tokio::test]
    async fn test_lookup_by_content_hash() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = add(&mut conn, &new_track("file:///m/a.mp3", 1)).await.unwrap();
        assert_eq!(get_id_by_lp_track_id(&mut conn, "hash").await.unwrap(), Some(id));
        assert_eq!(get_id_by_lp_track_id(&mut conn, "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uri_is_unique() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        add(&mut conn, &new_track("file:///m/a.mp3", 1)).await.unwrap();
        assert!(add(&mut conn, &new_track("file:///m/a.mp3", 1)).await.is_err());
    }

    #[tokio::test]
    async fn test_basename_duration_lookup() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        add(&mut conn, &new_track("file:///old/My%20Song.mp3", 1)).await.unwrap();
        add(&mut conn, &new_track("file:///old/Other.mp3", 1)).await.unwrap();

        let found = get_by_basename_duration(&mut conn, "My Song.mp3", 180_000).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(get_by_basename_duration(&mut conn, "My Song.mp3", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uris_filtered_by_storage() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        add(&mut conn, &new_track("file:///m/a.mp3", 1)).await.unwrap();
        add(
            &mut conn,
            &NewTrack {
                storage_type: StorageType::EXTERNAL.to_db(),
                ..new_track("file:///tmp/b.mp3", 2)
            },
        )
        .await
        .unwrap();

        let uris = get_uris(&mut conn, StorageType::COLLECTION).await.unwrap();
        assert_eq!(uris, vec!["file:///m/a.mp3".to_string()]);
        assert_eq!(get_mtimes(&mut conn).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_year_for_album() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        for (uri, year, ts) in [
            ("file:///m/1.mp3", Some(2001), Some(300)),
            ("file:///m/2.mp3", Some(1999), Some(100)),
            ("file:///m/3.mp3", Some(2001), Some(200)),
            ("file:///m/4.mp3", None, None),
        ] {
            add(&mut conn, &NewTrack { year, timestamp: ts, ..new_track(uri, 1) })
                .await
                .unwrap();
        }

        assert_eq!(get_year_for_album(&mut conn, 1).await.unwrap(), (Some(2001), Some(100)));
        assert_eq!(get_year_for_album(&mut conn, 9).await.unwrap(), (None, None));
    }

    #[tokio::test]
    async fn test_remove_drops_links() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let id = add(&mut conn, &new_track("file:///m/a.mp3", 1)).await.unwrap();
        add_artist(&mut conn, id, 5, 0).await.unwrap();
        add_genre(&mut conn, id, 6).await.unwrap();
        assert_eq!(get_artist_ids(&mut conn, id).await.unwrap(), vec![5]);
        assert_eq!(get_genre_ids_for_album(&mut conn, 1).await.unwrap(), vec![6]);

        remove(&mut conn, id).await.unwrap();
        assert!(get(&mut conn, id).await.unwrap().is_none());
        assert!(get_artist_ids(&mut conn, id).await.unwrap().is_empty());
        assert!(get_genre_ids(&mut conn, id).await.unwrap().is_empty());
    }
}
