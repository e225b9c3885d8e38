//! Per-file statistics kept across delete/re-add cycles.
//!
//! Records are keyed by `(basename, duration)` rather than by URI, so a
//! file that was moved or renamed elsewhere in the tree recovers its
//! popularity, rating and loved state on the next scan. Entries are never
//! evicted.

use sqlx::{FromRow, SqliteConnection};

/// Statistics of a track and its album at the time it was removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct HistoryRecord {
    pub popularity: i64,
    pub rate: i64,
    pub ltime: i64,
    /// Album modification time
    pub mtime: i64,
    pub loved: i64,
    pub album_loved: i64,
    pub album_popularity: i64,
    pub album_rate: i64,
    pub album_synced: i64,
}

/// Store (or replace) the record for `(name, duration)`.
///
/// # Arguments
///
/// * `conn` - Pooled connection or open transaction
/// * `name` - File name of the removed track
/// * `duration` - Track duration in milliseconds
/// * `stats` - Track and album statistics to keep
///
/// # Errors
///
/// Returns an error if the upsert fails.
pub async fn record(
    conn: &mut SqliteConnection,
    name: &str,
    duration: i64,
    stats: &HistoryRecord,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO history (name, duration, popularity, rate, ltime, mtime,
                                        loved, album_loved, album_popularity, album_rate,
                                        album_synced)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(duration)
    .bind(stats.popularity)
    .bind(stats.rate)
    .bind(stats.ltime)
    .bind(stats.mtime)
    .bind(stats.loved)
    .bind(stats.album_loved)
    .bind(stats.album_popularity)
    .bind(stats.album_rate)
    .bind(stats.album_synced)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn get(
    conn: &mut SqliteConnection,
    name: &str,
    duration: i64,
) -> sqlx::Result<Option<HistoryRecord>> {
    sqlx::query_as::<_, HistoryRecord>(
        r#"
        SELECT popularity, rate, ltime, mtime, loved, album_loved, album_popularity,
               album_rate, album_synced
        FROM history WHERE name = ? AND duration = ?
        "#,
    )
    .bind(name)
    .bind(duration)
    .fetch_optional(&mut *conn)
    .await
}

/// Stored statistics, or zeros when nothing was recorded.
pub async fn lookup(
    conn: &mut SqliteConnection,
    name: &str,
    duration: i64,
) -> sqlx::Result<HistoryRecord> {
    Ok(get(conn, name, duration).await?.unwrap_or_default())
}

pub async fn remove(conn: &mut SqliteConnection, name: &str, duration: i64) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM history WHERE name = ? AND duration = ?")
        .bind(name)
        .bind(duration)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    #[tokio::test]
    async fn test_lookup_missing_is_zeros() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let stats = lookup(&mut conn, "song.mp3", 1000).await.unwrap();
        assert_eq!(stats, HistoryRecord::default());
    }

    #[tokio::test]
    async fn test_record_replace_and_remove() {
        let (pool, _dir) = temp_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = HistoryRecord { popularity: 5, ..Default::default() };
        record(&mut conn, "song.mp3", 1000, &first).await.unwrap();
        let second = HistoryRecord { popularity: 7, loved: 1, ..Default::default() };
        record(&mut conn, "song.mp3", 1000, &second).await.unwrap();

        assert_eq!(lookup(&mut conn, "song.mp3", 1000).await.unwrap(), second);
        // Same name, different duration is a different file
        assert!(get(&mut conn, "song.mp3", 2000).await.unwrap().is_none());

        remove(&mut conn, "song.mp3", 1000).await.unwrap();
        assert!(get(&mut conn, "song.mp3", 1000).await.unwrap().is_none());
    }
}
