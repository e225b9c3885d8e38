//! Artist rows.

use sqlx::SqliteConnection;

use crate::model::Artist;

/// Id of the artist with this exact name.
pub async fn get_id(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM artists WHERE name = ? AND id >= 0 LIMIT 1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn get(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, sortname, mb_artist_id, featuring FROM artists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
}

/// Artists credited on tracks of this genre, by name.
pub async fn get_ids_for_genre(conn: &mut SqliteConnection, genre_id: i64) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT artists.id FROM artists
        JOIN track_artists ON track_artists.artist_id = artists.id
        JOIN track_genres ON track_genres.track_id = track_artists.track_id
        WHERE track_genres.genre_id = ?
        ORDER BY artists.name COLLATE NOCASE
        "#,
    )
    .bind(genre_id)
    .fetch_all(&mut *conn)
    .await
}

/// Insert a new artist.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `name` - Display name, stored as given
/// * `sortname` - Sort name from tags, or empty
/// * `mb_artist_id` - MusicBrainz artist id, or empty
///
/// # Returns
///
/// The id of the inserted artist.
pub async fn add(
    conn: &mut SqliteConnection,
    name: &str,
    sortname: &str,
    mb_artist_id: &str,
) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO artists (name, sortname, mb_artist_id) VALUES (?, ?, ?)")
            .bind(name)
            .bind(sortname)
            .bind(mb_artist_id)
            .execute(&mut *conn)
            .await?;
    Ok(result.last_insert_rowid())
}

/// Fill in sortname / MusicBrainz id when the stored row has none.
pub async fn fill_missing(
    conn: &mut SqliteConnection,
    id: i64,
    sortname: &str,
    mb_artist_id: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE artists SET
            sortname = CASE WHEN sortname = '' THEN ? ELSE sortname END,
            mb_artist_id = CASE WHEN mb_artist_id = '' THEN ? ELSE mb_artist_id END
        WHERE id = ?
        "#,
    )
    .bind(sortname)
    .bind(mb_artist_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Delete the artist if no track or album references it.
///
/// Reserved (negative) ids are never deleted. Returns true if a row was removed.
pub async fn clean(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<bool> {
    if id < 0 {
        return Ok(false);
    }
    let result = sqlx::query(
        r#"
        DELETE FROM artists WHERE id = ?1
            AND NOT EXISTS (SELECT 1 FROM track_artists WHERE artist_id = ?1)
            AND NOT EXISTS (SELECT 1 FROM album_artists WHERE artist_id = ?1)
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Flag artists that appear on tracks but on no album.
///
/// Only rows whose flag actually changes are written, so running it over an
/// unchanged collection leaves the database untouched.
///
/// # Returns
///
/// The number of artists whose flag changed.
pub async fn update_featuring(conn: &mut SqliteConnection) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE artists SET featuring = (
            EXISTS (SELECT 1 FROM track_artists ta WHERE ta.artist_id = artists.id)
            AND NOT EXISTS (SELECT 1 FROM album_artists aa WHERE aa.artist_id = artists.id)
        )
        WHERE featuring IS NOT (
            EXISTS (SELECT 1 FROM track_artists ta WHERE ta.artist_id = artists.id)
            AND NOT EXISTS (SELECT 1 FROM album_artists aa WHERE aa.artist_id = artists.id)
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}
