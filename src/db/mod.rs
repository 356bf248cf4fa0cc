use crate::{
    error::AppResult,
    models::{CacheEntry, Level},
};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Maximum age of a cache entry still eligible to be served as a hit.
/// Older rows are treated as misses but are never actively purged.
pub const CACHE_VALIDITY_DAYS: i64 = 30;

/// Append-only store for recommendation cache entries
///
/// Concurrent writers racing to store the same key are acceptable; duplicate
/// rows are harmless because lookup always resolves by most-recent.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Returns the newest entry for signature+level created within the
    /// validity window, or `None` on a miss.
    async fn latest(&self, signature: &str, level: Level) -> AppResult<Option<CacheEntry>>;

    /// Appends a new entry; never overwrites existing rows.
    async fn append(&self, entry: &CacheEntry) -> AppResult<()>;
}
