//! Database access for setid-rec
//!
//! One SQLite file per input recording, holding the per-segment cache.

pub mod segment_cache;

pub use segment_cache::{CacheStats, SegmentCache};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// Subfolder of the data dir holding cache databases
const CACHE_SUBDIR: &str = "shazam_cache";

/// Cache database path for `audio_path`, keyed by a hash of the path
pub fn cache_db_path(data_dir: &Path, audio_path: &Path) -> PathBuf {
    data_dir.join(CACHE_SUBDIR).join(format!(
        "shazam_cache_{}.db",
        setid_common::config::path_hash(audio_path)
    ))
}

/// Open (creating if needed) the SQLite file at `db_path`
pub async fn init_cache_pool(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to segment cache: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    // WAL lets progress readers run while recognition tasks write rows
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    Ok(pool)
}
