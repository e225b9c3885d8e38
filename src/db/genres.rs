//! Genre rows.

use sqlx::SqliteConnection;

/// Id of the genre with this exact name.
pub async fn get_id(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar("SELECT id FROM genres WHERE name = ? LIMIT 1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn get_name(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("SELECT name FROM genres WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Insert a new genre.
///
/// # Returns
///
/// The id of the inserted genre.
pub async fn add(conn: &mut SqliteConnection, name: &str) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO genres (name) VALUES (?)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Delete the genre if no track or album references it.
pub async fn clean(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<bool> {
    if id < 0 {
        return Ok(false);
    }
    let result = sqlx::query(
        r#"
        DELETE FROM genres WHERE id = ?1
            AND NOT EXISTS (SELECT 1 FROM track_genres WHERE genre_id = ?1)
            AND NOT EXISTS (SELECT 1 FROM album_genres WHERE genre_id = ?1)
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
