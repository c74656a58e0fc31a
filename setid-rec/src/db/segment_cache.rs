//! Per-segment recognition cache
//!
//! One row per [`SegmentCacheKey`]. Rows are written as soon as each segment
//! is recognized, so an interrupted run resumes from whatever was stored.
//! Rows for a file whose leading bytes changed are never looked up again.

use serde::Serialize;
use setid_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::models::{SegmentCacheKey, SegmentResult};

/// Per-file cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_segments: i64,
    pub segments_with_match: i64,
    pub unique_tracks: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SegmentRow {
    start_ms: i64,
    result_json: Option<String>,
    track_id: Option<String>,
    title: Option<String>,
    artist: Option<String>,
}

impl SegmentRow {
    fn into_result(self) -> SegmentResult {
        let raw_response = self.result_json.as_deref().and_then(|json| {
            serde_json::from_str(json)
                .map_err(|e| warn!(start_ms = self.start_ms, "Unreadable cached payload: {}", e))
                .ok()
        });

        SegmentResult {
            start_ms: self.start_ms,
            raw_response,
            track_id: self.track_id,
            title: self.title,
            artist: self.artist,
        }
    }
}

/// SQLite-backed segment cache
#[derive(Clone)]
pub struct SegmentCache {
    pool: SqlitePool,
}

impl SegmentCache {
    /// Open the cache file at `db_path`, creating file and schema if absent
    pub async fn open(db_path: &Path) -> std::result::Result<Self, PipelineError> {
        let cache_init = |source| PipelineError::CacheInit {
            path: db_path.to_path_buf(),
            source,
        };

        let pool = super::init_cache_pool(db_path).await.map_err(cache_init)?;
        let cache = Self::from_pool(pool).await.map_err(cache_init)?;
        info!("Segment cache ready: {}", db_path.display());
        Ok(cache)
    }

    /// Wrap an existing pool and ensure the schema exists
    pub async fn from_pool(pool: SqlitePool) -> std::result::Result<Self, sqlx::Error> {
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Cached result for `key`, if any
    pub async fn get(&self, key: &SegmentCacheKey) -> Result<Option<SegmentResult>> {
        let row: Option<SegmentRow> = sqlx::query_as(
            "SELECT start_ms, result_json, track_id, title, artist
             FROM segment_results WHERE cache_key = ?",
        )
        .bind(key.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(SegmentRow::into_result))
    }

    /// Insert or replace the row for `key`
    pub async fn set(&self, key: &SegmentCacheKey, result: &SegmentResult) -> Result<()> {
        let result_json = result
            .raw_response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| Error::InvalidInput(format!("Unserializable payload: {}", e)))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO segment_results
                (cache_key, audio_hash, start_ms, duration_ms, result_json,
                 track_id, title, artist)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.to_string())
        .bind(&key.audio_file_hash)
        .bind(key.start_ms)
        .bind(key.duration_ms)
        .bind(result_json)
        .bind(&result.track_id)
        .bind(&result.title)
        .bind(&result.artist)
        .execute(&self.pool)
        .await?;

        debug!(cache_key = %key, has_match = result.has_match(), "Cached segment result");
        Ok(())
    }

    pub async fn has(&self, audio_hash: &str, start_ms: i64, duration_ms: i64) -> Result<bool> {
        let key = SegmentCacheKey::new(audio_hash, start_ms, duration_ms);
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM segment_results WHERE cache_key = ?")
                .bind(key.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// All cached start times for one file
    pub async fn get_cached_segments(&self, audio_hash: &str) -> Result<HashSet<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT start_ms FROM segment_results WHERE audio_hash = ?")
                .bind(audio_hash)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(start_ms,)| start_ms).collect())
    }

    /// Every cached result for one file, ordered by start time
    pub async fn get_all_results(&self, audio_hash: &str) -> Result<Vec<SegmentResult>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            "SELECT start_ms, result_json, track_id, title, artist
             FROM segment_results
             WHERE audio_hash = ?
             ORDER BY start_ms",
        )
        .bind(audio_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SegmentRow::into_result).collect())
    }

    /// Cached results that identified a track, ordered by start time
    pub async fn get_matches_only(&self, audio_hash: &str) -> Result<Vec<SegmentResult>> {
        let rows: Vec<SegmentRow> = sqlx::query_as(
            "SELECT start_ms, result_json, track_id, title, artist
             FROM segment_results
             WHERE audio_hash = ? AND track_id IS NOT NULL
             ORDER BY start_ms",
        )
        .bind(audio_hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SegmentRow::into_result).collect())
    }

    /// Delete every row for one file; returns the number removed
    pub async fn clear_for_audio(&self, audio_hash: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM segment_results WHERE audio_hash = ?")
            .bind(audio_hash)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!("Cleared {} cached segments for audio hash {}", deleted, audio_hash);
        Ok(deleted)
    }

    pub async fn get_cache_stats(&self, audio_hash: &str) -> Result<CacheStats> {
        let (total_segments, segments_with_match, unique_tracks): (i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(track_id),
                    COUNT(DISTINCT track_id)
                FROM segment_results
                WHERE audio_hash = ?
                "#,
            )
            .bind(audio_hash)
            .fetch_one(&self.pool)
            .await?;

        Ok(CacheStats {
            total_segments,
            segments_with_match,
            unique_tracks,
        })
    }

    /// Close the underlying pool (flushes WAL)
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Create table and indexes (idempotent)
async fn init_schema(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segment_results (
            cache_key TEXT PRIMARY KEY,
            audio_hash TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL,
            result_json TEXT,
            track_id TEXT,
            title TEXT,
            artist TEXT,
            created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audio_hash ON segment_results(audio_hash)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_audio_hash_start ON segment_results(audio_hash, start_ms)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_cache() -> SegmentCache {
        // Single connection: each :memory: connection is its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SegmentCache::from_pool(pool).await.unwrap()
    }

    fn hit(start_ms: i64, track_id: &str) -> SegmentResult {
        SegmentResult {
            start_ms,
            raw_response: Some(json!({"track": {"key": track_id, "title": "T", "subtitle": "A"}})),
            track_id: Some(track_id.to_string()),
            title: Some("T".to_string()),
            artist: Some("A".to_string()),
        }
    }

    fn miss(start_ms: i64) -> SegmentResult {
        SegmentResult {
            start_ms,
            raw_response: Some(json!({"matches": []})),
            track_id: None,
            title: None,
            artist: None,
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = setup_cache().await;
        let key = SegmentCacheKey::new("hash", 30_000, 15_000);
        let result = hit(30_000, "42");

        cache.set(&key, &result).await.unwrap();
        let loaded = cache.get(&key).await.unwrap().expect("cached row");
        assert_eq!(loaded, result);
    }

    #[tokio::test]
    async fn test_get_absent() {
        let cache = setup_cache().await;
        let key = SegmentCacheKey::new("hash", 0, 15_000);
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_existing_row() {
        let cache = setup_cache().await;
        let key = SegmentCacheKey::new("hash", 0, 15_000);

        cache.set(&key, &miss(0)).await.unwrap();
        cache.set(&key, &hit(0, "7")).await.unwrap();

        let loaded = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.track_id.as_deref(), Some("7"));
        assert_eq!(cache.get_cache_stats("hash").await.unwrap().total_segments, 1);
    }

    #[tokio::test]
    async fn test_no_match_round_trip_without_payload() {
        let cache = setup_cache().await;
        let key = SegmentCacheKey::new("hash", 0, 15_000);
        cache.set(&key, &SegmentResult::empty(0)).await.unwrap();

        let loaded = cache.get(&key).await.unwrap().unwrap();
        assert!(loaded.raw_response.is_none());
        assert!(!loaded.has_match());
    }

    #[tokio::test]
    async fn test_has_respects_duration() {
        let cache = setup_cache().await;
        cache
            .set(&SegmentCacheKey::new("hash", 0, 15_000), &miss(0))
            .await
            .unwrap();

        assert!(cache.has("hash", 0, 15_000).await.unwrap());
        assert!(!cache.has("hash", 0, 10_000).await.unwrap());
        assert!(!cache.has("other", 0, 15_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_cached_segments_scoped_to_hash() {
        let cache = setup_cache().await;
        for start in [0, 30_000, 60_000] {
            cache
                .set(&SegmentCacheKey::new("a", start, 15_000), &miss(start))
                .await
                .unwrap();
        }
        cache
            .set(&SegmentCacheKey::new("b", 90_000, 15_000), &miss(90_000))
            .await
            .unwrap();

        let starts = cache.get_cached_segments("a").await.unwrap();
        assert_eq!(starts, HashSet::from([0, 30_000, 60_000]));
    }

    #[tokio::test]
    async fn test_results_ordered_and_filtered() {
        let cache = setup_cache().await;
        let rows = [hit(60_000, "1"), miss(0), hit(30_000, "2"), miss(90_000)];
        for row in &rows {
            cache
                .set(&SegmentCacheKey::new("h", row.start_ms, 15_000), row)
                .await
                .unwrap();
        }

        let all = cache.get_all_results("h").await.unwrap();
        let starts: Vec<i64> = all.iter().map(|r| r.start_ms).collect();
        assert_eq!(starts, vec![0, 30_000, 60_000, 90_000]);

        let matches = cache.get_matches_only("h").await.unwrap();
        let starts: Vec<i64> = matches.iter().map(|r| r.start_ms).collect();
        assert_eq!(starts, vec![30_000, 60_000]);
        assert!(matches.iter().all(SegmentResult::has_match));
    }

    #[tokio::test]
    async fn test_clear_for_audio() {
        let cache = setup_cache().await;
        for start in [0, 30_000] {
            cache
                .set(&SegmentCacheKey::new("a", start, 15_000), &miss(start))
                .await
                .unwrap();
        }
        cache
            .set(&SegmentCacheKey::new("b", 0, 15_000), &miss(0))
            .await
            .unwrap();

        assert_eq!(cache.clear_for_audio("a").await.unwrap(), 2);
        assert!(cache.get_cached_segments("a").await.unwrap().is_empty());
        assert_eq!(cache.get_cached_segments("b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = setup_cache().await;
        let rows = [hit(0, "1"), hit(30_000, "1"), hit(60_000, "2"), miss(90_000)];
        for row in &rows {
            cache
                .set(&SegmentCacheKey::new("h", row.start_ms, 15_000), row)
                .await
                .unwrap();
        }

        let stats = cache.get_cache_stats("h").await.unwrap();
        assert_eq!(
            stats,
            CacheStats {
                total_segments: 4,
                segments_with_match: 3,
                unique_tracks: 2,
            }
        );
        assert_eq!(cache.get_cache_stats("none").await.unwrap(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_schema_init_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let first = SegmentCache::from_pool(pool.clone()).await.unwrap();
        first
            .set(&SegmentCacheKey::new("h", 0, 15_000), &miss(0))
            .await
            .unwrap();

        let second = SegmentCache::from_pool(pool).await.unwrap();
        assert!(second.has("h", 0, 15_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let db_path = temp.path().join("nested").join("cache.db");

        let cache = SegmentCache::open(&db_path).await.unwrap();
        cache
            .set(&SegmentCacheKey::new("h", 0, 15_000), &miss(0))
            .await
            .unwrap();
        cache.close().await;

        assert!(db_path.exists());
        let reopened = SegmentCache::open(&db_path).await.unwrap();
        assert!(reopened.has("h", 0, 15_000).await.unwrap());
    }
}
