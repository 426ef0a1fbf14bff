use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use super::models::{NewsView, DEFAULT_CATEGORY};
use crate::config::AppConfig;
use crate::storage::NewsStore;
use crate::Result;

/// Shown when the store has nothing to offer
const FALLBACK_NEWS: [(&str, &str); 3] = [
    ("Confira as últimas notícias do TJES", "05/12"),
    ("Acompanhe as novidades da Justiça Estadual", "04/12"),
    ("Acesse o portal de notícias do Tribunal", "03/12"),
];

/// Read side of the news store
pub struct NewsQuery {
    store: Arc<dyn NewsStore>,
    display_offset: FixedOffset,
    portal_url: String,
}

impl NewsQuery {
    pub fn new(
        store: Arc<dyn NewsStore>,
        display_offset: FixedOffset,
        portal_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            display_offset,
            portal_url: portal_url.into(),
        }
    }

    pub fn from_config(config: &AppConfig, store: Arc<dyn NewsStore>) -> Result<Self> {
        Ok(Self::new(
            store,
            config.schedule.offset()?,
            config.news.portal_url.clone(),
        ))
    }

    /// Newest active news, or the fixed fallback set when the store is
    /// empty or unreadable
    pub async fn get_active_news(&self, limit: u32) -> Vec<NewsView> {
        match self.store.list_active(limit).await {
            Ok(rows) if !rows.is_empty() => rows
                .into_iter()
                .map(|row| NewsView::from_stored(row, &self.display_offset))
                .collect(),
            Ok(_) => {
                tracing::debug!("No active news stored, serving fallback");
                self.fallback_news()
            }
            Err(e) => {
                tracing::warn!("Failed to read news, serving fallback: {}", e);
                self.fallback_news()
            }
        }
    }

    pub fn fallback_news(&self) -> Vec<NewsView> {
        let now = Utc::now();
        FALLBACK_NEWS
            .iter()
            .enumerate()
            .map(|(i, (title, date))| NewsView {
                id: format!("fallback-{}", i),
                title: title.to_string(),
                link: self.portal_url.clone(),
                description: None,
                category: Some(DEFAULT_CATEGORY.to_string()),
                published_at: now,
                date: date.to_string(),
            })
            .collect()
    }

    /// When the store was last written by a run
    pub async fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
        match self.store.last_fetched_at().await {
            Ok(latest) => latest,
            Err(e) => {
                tracing::warn!("Failed to read last fetch time: {}", e);
                None
            }
        }
    }

    /// Real number of active rows, fallback items not included
    pub async fn count_active(&self) -> u64 {
        match self.store.count_active().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Failed to count news: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::{NewsItem, StoredNews};
    use crate::storage::{Database, NewsRepository};
    use crate::Error;
    use async_trait::async_trait;
    use chrono::TimeZone;

    const PORTAL: &str = "https://www.tjes.jus.br/category/noticias/";

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    async fn query() -> (NewsQuery, Arc<NewsRepository>) {
        let repo = Arc::new(NewsRepository::new(Database::new_in_memory().await.unwrap()));
        (NewsQuery::new(repo.clone(), brt(), PORTAL), repo)
    }

    #[tokio::test]
    async fn test_empty_store_serves_fallback() {
        let (query, _) = query().await;

        let news = query.get_active_news(10).await;
        let dates: Vec<&str> = news.iter().map(|n| n.date.as_str()).collect();
        assert_eq!(dates, vec!["05/12", "04/12", "03/12"]);
        assert_eq!(news[0].id, "fallback-0");
        assert_eq!(news[0].title, "Confira as últimas notícias do TJES");
        assert!(news.iter().all(|n| n.link == PORTAL && n.description.is_none()));

        assert_eq!(query.count_active().await, 0);
        assert!(query.last_fetch_time().await.is_none());
    }

    #[tokio::test]
    async fn test_stored_news_projected_with_local_date() {
        let (query, repo) = query().await;
        repo.upsert(&NewsItem {
            external_id: "42".to_string(),
            title: "TJES publica edital de leilão".to_string(),
            link: "https://www.tjes.jus.br/edital/".to_string(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            // 01:30 UTC is still the previous day in Brasília
            published_at: Utc.with_ymd_and_hms(2024, 12, 5, 1, 30, 0).unwrap(),
        })
        .await
        .unwrap();

        let news = query.get_active_news(10).await;
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "TJES publica edital de leilão");
        assert_eq!(news[0].date, "04/12");
        assert_eq!(query.count_active().await, 1);
        assert!(query.last_fetch_time().await.is_some());
    }

    struct BrokenStore;

    #[async_trait]
    impl NewsStore for BrokenStore {
        async fn upsert(&self, _item: &NewsItem) -> Result<()> {
            Err(Error::Other("database is locked".to_string()))
        }

        async fn list_active(&self, _limit: u32) -> Result<Vec<StoredNews>> {
            Err(Error::Other("database is locked".to_string()))
        }

        async fn count_active(&self) -> Result<u64> {
            Err(Error::Other("database is locked".to_string()))
        }

        async fn last_fetched_at(&self) -> Result<Option<DateTime<Utc>>> {
            Err(Error::Other("database is locked".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_errors_are_masked() {
        let query = NewsQuery::new(Arc::new(BrokenStore), brt(), PORTAL);

        assert_eq!(query.get_active_news(5).await.len(), 3);
        assert_eq!(query.count_active().await, 0);
        assert!(query.last_fetch_time().await.is_none());
    }
}
