use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::retry::{execute_with_retry, query_with_retry};
use super::{Database, NewsStore};
use crate::news::{NewsItem, StoredNews};
use crate::Result;

/// SQLite backed news store
#[derive(Clone)]
pub struct NewsRepository {
    db: Database,
}

#[derive(FromRow)]
struct NewsRow {
    id: String,
    external_id: String,
    title: String,
    link: String,
    description: Option<String>,
    category: Option<String>,
    published_at: DateTime<Utc>,
    is_active: i32,
    fetched_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<NewsRow> for StoredNews {
    fn from(row: NewsRow) -> Self {
        StoredNews {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            external_id: row.external_id,
            title: row.title,
            link: row.link,
            description: row.description,
            category: row.category,
            published_at: row.published_at,
            is_active: row.is_active != 0,
            fetched_at: row.fetched_at,
            created_at: row.created_at,
        }
    }
}

impl NewsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[cfg(test)]
impl NewsRepository {
    /// Find a row by its upstream identifier
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<StoredNews>> {
        let row: Option<NewsRow> = sqlx::query_as(
            r#"
            SELECT id, external_id, title, link, description, category,
                   published_at, is_active, fetched_at, created_at
            FROM news
            WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(StoredNews::from))
    }

    /// Hide or show a row on the read path
    pub async fn set_active(&self, external_id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE news SET is_active = ? WHERE external_id = ?")
            .bind(active as i32)
            .bind(external_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl NewsStore for NewsRepository {
    async fn upsert(&self, item: &NewsItem) -> Result<()> {
        let pool = self.db.pool().clone();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        execute_with_retry(|| {
            let pool = pool.clone();
            let id = id.clone();
            let item = item.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO news
                    (id, external_id, title, link, description, category, published_at, is_active, fetched_at, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
                    ON CONFLICT(external_id) DO UPDATE SET
                        title = excluded.title,
                        link = excluded.link,
                        description = excluded.description,
                        category = excluded.category,
                        published_at = excluded.published_at,
                        is_active = 1,
                        fetched_at = excluded.fetched_at
                    "#,
                )
                .bind(&id)
                .bind(&item.external_id)
                .bind(&item.title)
                .bind(&item.link)
                .bind(&item.description)
                .bind(&item.category)
                .bind(item.published_at)
                .bind(now)
                .bind(now)
                .execute(&pool)
                .await?;
                Ok(())
            }
        })
        .await?;

        Ok(())
    }

    async fn list_active(&self, limit: u32) -> Result<Vec<StoredNews>> {
        let pool = self.db.pool();
        let rows: Vec<NewsRow> = query_with_retry(|| {
            sqlx::query_as(
                r#"
                SELECT id, external_id, title, link, description, category,
                       published_at, is_active, fetched_at, created_at
                FROM news
                WHERE is_active = 1
                ORDER BY published_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
        })
        .await?;

        Ok(rows.into_iter().map(StoredNews::from).collect())
    }

    async fn count_active(&self) -> Result<u64> {
        let pool = self.db.pool();
        let count: i64 = query_with_retry(|| {
            sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE is_active = 1").fetch_one(pool)
        })
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>> {
        let pool = self.db.pool();
        let latest: Option<DateTime<Utc>> = query_with_retry(|| {
            sqlx::query_scalar("SELECT fetched_at FROM news ORDER BY fetched_at DESC LIMIT 1")
                .fetch_optional(pool)
        })
        .await?;

        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(id: &str, title: &str, day: u32) -> NewsItem {
        NewsItem {
            external_id: id.to_string(),
            title: title.to_string(),
            link: format!("https://www.tjes.jus.br/{id}/"),
            description: String::new(),
            category: "Notícia".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 12, day, 12, 0, 0).unwrap(),
        }
    }

    async fn repo() -> NewsRepository {
        NewsRepository::new(Database::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let repo = repo().await;
        let first = item("42", "Edital de leilão publicado", 5);

        repo.upsert(&first).await.unwrap();
        let original = repo.find_by_external_id("42").await.unwrap().unwrap();
        repo.upsert(&first).await.unwrap();

        assert_eq!(repo.count_active().await.unwrap(), 1);
        let again = repo.find_by_external_id("42").await.unwrap().unwrap();
        assert_eq!(again.id, original.id);
        assert_eq!(again.created_at, original.created_at);
    }

    #[tokio::test]
    async fn test_upsert_updates_fields_and_reactivates() {
        let repo = repo().await;
        repo.upsert(&item("42", "Título antigo da notícia", 5)).await.unwrap();
        repo.set_active("42", false).await.unwrap();
        assert_eq!(repo.count_active().await.unwrap(), 0);

        let mut updated = item("42", "Título corrigido da notícia", 6);
        updated.description = "Resumo".to_string();
        repo.upsert(&updated).await.unwrap();

        let row = repo.find_by_external_id("42").await.unwrap().unwrap();
        assert_eq!(row.title, "Título corrigido da notícia");
        assert_eq!(row.description.as_deref(), Some("Resumo"));
        assert_eq!(row.published_at, updated.published_at);
        assert!(row.is_active);
    }

    #[tokio::test]
    async fn test_list_active_newest_first_with_limit() {
        let repo = repo().await;
        repo.upsert(&item("1", "Notícia do dia três", 3)).await.unwrap();
        repo.upsert(&item("2", "Notícia do dia cinco", 5)).await.unwrap();
        repo.upsert(&item("3", "Notícia do dia quatro", 4)).await.unwrap();
        repo.set_active("2", false).await.unwrap();

        let rows = repo.list_active(10).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.external_id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1"]);

        assert_eq!(repo.list_active(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_fetched_at() {
        let repo = repo().await;
        assert!(repo.last_fetched_at().await.unwrap().is_none());

        let before = Utc::now() - Duration::seconds(1);
        repo.upsert(&item("1", "Notícia recém buscada", 3)).await.unwrap();
        let last = repo.last_fetched_at().await.unwrap().unwrap();
        assert!(last >= before);
    }
}
