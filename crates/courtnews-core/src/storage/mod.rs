mod database;
mod news_repo;
pub mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::news::{NewsItem, StoredNews};
use crate::Result;

pub use database::Database;
pub use news_repo::NewsRepository;

/// Persistence used by the pipeline and the read path
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Insert or update the row keyed by `item.external_id`
    async fn upsert(&self, item: &NewsItem) -> Result<()>;

    /// Active rows, newest `published_at` first
    async fn list_active(&self, limit: u32) -> Result<Vec<StoredNews>>;

    async fn count_active(&self) -> Result<u64>;

    /// Most recent `fetched_at` over all rows
    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>>;
}
