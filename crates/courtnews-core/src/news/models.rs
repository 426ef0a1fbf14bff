use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category used when the source does not provide one
pub const DEFAULT_CATEGORY: &str = "Notícia";

/// Format a source payload is expected in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Feed,
    Html,
}

impl SourceKind {
    /// Accept header sent when fetching this kind of source
    pub fn accept_header(&self) -> &'static str {
        match self {
            SourceKind::Feed => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,application/rss+xml,*/*;q=0.8"
            }
            SourceKind::Html => "text/html,*/*",
        }
    }
}

/// Item as extracted by a parser, before date handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub category: String,
    /// Raw date text; `None` when the source carries no dates
    pub pub_date: Option<String>,
}

/// A news item parsed from a source, ready to be stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
}

impl NewsItem {
    /// Build an item from parser output. Unparseable or missing dates fall
    /// back to `fetched_at`.
    pub fn from_raw(raw: RawItem, fetched_at: DateTime<Utc>) -> Self {
        let published_at = match raw.pub_date.as_deref() {
            Some(text) => parse_pub_date(text).unwrap_or_else(|| {
                tracing::debug!("Unparseable date '{}' for item {}", text, raw.guid);
                fetched_at
            }),
            None => fetched_at,
        };

        Self {
            external_id: raw.guid,
            title: raw.title,
            link: raw.link,
            description: raw.description,
            category: raw.category,
            published_at,
        }
    }
}

/// Parse an RSS `pubDate` (RFC 2822), accepting RFC 3339 as well
pub fn parse_pub_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A persisted news row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredNews {
    pub id: Uuid,
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
    pub is_active: bool,
    pub fetched_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// News entry as served to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsView {
    pub id: String,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Day and month, "DD/MM"
    pub date: String,
}

impl NewsView {
    pub fn from_stored(news: StoredNews, display_offset: &FixedOffset) -> Self {
        Self {
            id: news.id.to_string(),
            date: format_day_month(&news.published_at, display_offset),
            title: news.title,
            link: news.link,
            description: news.description,
            category: news.category,
            published_at: news.published_at,
        }
    }
}

/// "DD/MM" in the given offset
pub fn format_day_month(at: &DateTime<Utc>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format("%d/%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(pub_date: Option<&str>) -> RawItem {
        RawItem {
            guid: "42".to_string(),
            title: "TJES publica edital de leilão".to_string(),
            link: "https://www.tjes.jus.br/edital/".to_string(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            pub_date: pub_date.map(str::to_string),
        }
    }

    #[test]
    fn test_rfc2822_pub_date() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let item = NewsItem::from_raw(raw(Some("Thu, 05 Dec 2024 14:30:00 +0000")), fetched);
        assert_eq!(
            item.published_at,
            Utc.with_ymd_and_hms(2024, 12, 5, 14, 30, 0).unwrap()
        );
        assert_eq!(item.external_id, "42");
    }

    #[test]
    fn test_bad_or_missing_date_uses_fetch_time() {
        let fetched = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(NewsItem::from_raw(raw(Some("ontem")), fetched).published_at, fetched);
        assert_eq!(NewsItem::from_raw(raw(None), fetched).published_at, fetched);
    }

    #[test]
    fn test_day_month_uses_display_offset() {
        let at = Utc.with_ymd_and_hms(2024, 12, 5, 1, 0, 0).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        assert_eq!(format_day_month(&at, &utc), "05/12");
        assert_eq!(format_day_month(&at, &brt), "04/12");
    }
}
