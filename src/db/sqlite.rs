use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use uuid::Uuid;

use crate::{
    db::{RecommendationStore, CACHE_VALIDITY_DAYS},
    error::{AppError, AppResult},
    models::{CacheEntry, Level},
};

/// SQLite-backed recommendation cache
///
/// Rows are append-only; expired rows stay in place until externally cleaned.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the cache database at the given path
    pub async fn connect(path: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store; a single connection so all reads see all writes
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendation_cache (
                id TEXT PRIMARY KEY,
                signature TEXT NOT NULL,
                level TEXT NOT NULL,
                video_title TEXT NOT NULL,
                video_url TEXT NOT NULL,
                video_duration TEXT,
                reason TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recommendation_cache_key
            ON recommendation_cache (signature, level, created_at)
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> AppResult<CacheEntry> {
    let id: String = row.try_get("id")?;
    let level: String = row.try_get("level")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(CacheEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(format!("Malformed cache row id: {}", e)))?,
        signature: row.try_get("signature")?,
        level: Level::parse(&level)
            .ok_or_else(|| AppError::Internal(format!("Unknown cached level '{}'", level)))?,
        video_title: row.try_get("video_title")?,
        video_url: row.try_get("video_url")?,
        video_duration: row.try_get("video_duration")?,
        reason: row.try_get("reason")?,
        created_at: DateTime::<Utc>::from_timestamp(created_at, 0)
            .ok_or_else(|| AppError::Internal("Cache row timestamp out of range".to_string()))?,
    })
}

#[async_trait::async_trait]
impl RecommendationStore for SqliteStore {
    async fn latest(&self, signature: &str, level: Level) -> AppResult<Option<CacheEntry>> {
        let cutoff = (Utc::now() - Duration::days(CACHE_VALIDITY_DAYS)).timestamp();

        let row = sqlx::query(
            r#"
            SELECT id, signature, level, video_title, video_url, video_duration, reason, created_at
            FROM recommendation_cache
            WHERE signature = ? AND level = ? AND created_at >= ?
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(signature)
        .bind(level.as_str())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn append(&self, entry: &CacheEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_cache
                (id, signature, level, video_title, video_url, video_duration, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.signature)
        .bind(entry.level.as_str())
        .bind(&entry.video_title)
        .bind(&entry.video_url)
        .bind(&entry.video_duration)
        .bind(&entry.reason)
        .bind(entry.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
