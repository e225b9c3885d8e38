//! Album rows and their artist/genre links.

use sqlx::SqliteConnection;

use crate::model::{Album, COMPILATIONS_ARTIST_ID};

/// Fields of a new album row.
#[derive(Debug, Clone, Default)]
pub struct NewAlbum<'a> {
    pub name: &'a str,
    pub mb_album_id: &'a str,
    pub lp_album_id: &'a str,
    pub uri: &'a str,
    pub loved: i64,
    pub popularity: i64,
    pub rate: i64,
    pub synced: i64,
    pub mtime: i64,
    pub storage_type: i64,
}

/// Look up an album by content hash.
///
/// Albums without album artists are only the "same" album inside one
/// directory, so `uri` narrows the match when given.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `lp_album_id` - Content hash of the album (see [`crate::model::ids`])
/// * `uri` - Directory URI the album must live in, if any
///
/// # Returns
///
/// The album id, or `None` if no album matches.
pub async fn get_id(
    conn: &mut SqliteConnection,
    lp_album_id: &str,
    uri: Option<&str>,
) -> sqlx::Result<Option<i64>> {
    match uri {
        Some(uri) => {
            sqlx::query_scalar("SELECT id FROM albums WHERE lp_album_id = ? AND uri = ? LIMIT 1")
                .bind(lp_album_id)
                .bind(uri)
                .fetch_optional(&mut *conn)
                .await
        }
        None => {
            sqlx::query_scalar("SELECT id FROM albums WHERE lp_album_id = ? LIMIT 1")
                .bind(lp_album_id)
                .fetch_optional(&mut *conn)
                .await
        }
    }
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        r#"
        SELECT id, name, mb_album_id, lp_album_id, uri, loved, popularity, rate,
               synced, mtime, year, timestamp, storage_type
        FROM albums WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Insert an album row.
///
/// # Returns
///
/// The id of the inserted album.
pub async fn add(conn: &mut SqliteConnection, album: &NewAlbum<'_>) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO albums (name, mb_album_id, lp_album_id, uri, loved, popularity,
                            rate, synced, mtime, storage_type)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(album.name)
    .bind(album.mb_album_id)
    .bind(album.lp_album_id)
    .bind(album.uri)
    .bind(album.loved)
    .bind(album.popularity)
    .bind(album.rate)
    .bind(album.synced)
    .bind(album.mtime)
    .bind(album.storage_type)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Album artists in position order.
pub async fn get_artist_ids(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar(
        "SELECT artist_id FROM album_artists WHERE album_id = ? ORDER BY position, artist_id",
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await
}

/// Replace the album's artists.
pub async fn set_artist_ids(
    conn: &mut SqliteConnection,
    album_id: i64,
    artist_ids: &[i64],
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM album_artists WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    for (position, artist_id) in artist_ids.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO album_artists (album_id, artist_id, position) VALUES (?, ?, ?)",
        )
        .bind(album_id)
        .bind(artist_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Derive album artists from the artists of its tracks.
///
/// If every track carries the same artist set, that set is used. Otherwise
/// the album is a compilation: attributed to the reserved compilations
/// artist, or to the union of all track artists when compilations are
/// disabled.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `album_id` - Album whose tracks are inspected
/// * `disable_compilations` - Use the union of track artists instead of the
///   compilations artist
///
/// # Returns
///
/// Artist ids in credit order; empty if the album has no tracks.
pub async fn calculate_artist_ids(
    conn: &mut SqliteConnection,
    album_id: i64,
    disable_compilations: bool,
) -> sqlx::Result<Vec<i64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT ta.track_id, ta.artist_id
        FROM track_artists ta JOIN tracks t ON t.id = ta.track_id
        WHERE t.album_id = ?
        ORDER BY ta.track_id, ta.position, ta.artist_id
        "#,
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut sets: Vec<Vec<i64>> = Vec::new();
    let mut current: Option<(i64, Vec<i64>)> = None;
    for (track_id, artist_id) in rows {
        match current.as_mut() {
            Some((id, artists)) if *id == track_id => artists.push(artist_id),
            _ => {
                if let Some((_, artists)) = current.take() {
                    sets.push(artists);
                }
                current = Some((track_id, vec![artist_id]));
            }
        }
    }
    if let Some((_, artists)) = current {
        sets.push(artists);
    }

    let mut distinct: Vec<Vec<i64>> = Vec::new();
    for set in sets {
        let mut key = set.clone();
        key.sort_unstable();
        if !distinct.iter().any(|d| {
            let mut d = d.clone();
            d.sort_unstable();
            d == key
        }) {
            distinct.push(set);
        }
    }

    Ok(match distinct.len() {
        0 => Vec::new(),
        1 => distinct.remove(0),
        _ if disable_compilations => {
            let mut union = Vec::new();
            for id in distinct.into_iter().flatten() {
                if !union.contains(&id) {
                    union.push(id);
                }
            }
            union
        }
        _ => vec![COMPILATIONS_ARTIST_ID],
    })
}

pub async fn add_genre(conn: &mut SqliteConnection, album_id: i64, genre_id: i64) -> sqlx::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO album_genres (album_id, genre_id) VALUES (?, ?)")
        .bind(album_id)
        .bind(genre_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn get_genre_ids(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar("SELECT genre_id FROM album_genres WHERE album_id = ? ORDER BY genre_id")
        .bind(album_id)
        .fetch_all(&mut *conn)
        .await
}

/// Replace the album's genres.
pub async fn set_genre_ids(
    conn: &mut SqliteConnection,
    album_id: i64,
    genre_ids: &[i64],
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM album_genres WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    for genre_id in genre_ids {
        add_genre(conn, album_id, *genre_id).await?;
    }
    Ok(())
}

/// Store the album's aggregated year and earliest timestamp.
pub async fn set_year(
    conn: &mut SqliteConnection,
    album_id: i64,
    year: Option<i64>,
    timestamp: Option<i64>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET year = ?, timestamp = ? WHERE id = ?")
        .bind(year)
        .bind(timestamp)
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn track_count(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tracks WHERE album_id = ?")
        .bind(album_id)
        .fetch_one(&mut *conn)
        .await
}

/// Delete the album and its links if it has no tracks left.
///
/// # Returns
///
/// `true` if the album was removed, `false` if tracks still reference it.
pub async fn clean(conn: &mut SqliteConnection, album_id: i64) -> sqlx::Result<bool> {
    if track_count(conn, album_id).await? > 0 {
        return Ok(false);
    }
    sqlx::query("DELETE FROM album_artists WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM album_genres WHERE album_id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    let result = sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(album_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
