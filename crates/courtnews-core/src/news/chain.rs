use std::sync::Arc;

use chrono::Utc;

use super::fetcher::{HttpSourceClient, SourceClient};
use super::models::{NewsItem, SourceKind};
use super::parser::{FeedParser, HtmlParser, NewsParser};
use crate::config::NewsConfig;
use crate::Result;

/// One link of the fallback chain
pub struct NewsSource {
    pub label: String,
    pub url: String,
    pub kind: SourceKind,
    parser: Arc<dyn NewsParser>,
}

impl NewsSource {
    pub fn new(
        label: impl Into<String>,
        url: impl Into<String>,
        kind: SourceKind,
        parser: Arc<dyn NewsParser>,
    ) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            kind,
            parser,
        }
    }
}

/// Items obtained from the first source that produced any
#[derive(Debug, Clone)]
pub struct FetchedBatch {
    pub items: Vec<NewsItem>,
    pub source_label: String,
}

/// Ordered fallback chain of news sources.
///
/// Sources are tried one after the other, never concurrently: later entries
/// are slower mirrors that are only worth hitting when the earlier ones fail.
pub struct FetchChain {
    sources: Vec<NewsSource>,
    client: Arc<dyn SourceClient>,
}

impl FetchChain {
    pub fn new(sources: Vec<NewsSource>, client: Arc<dyn SourceClient>) -> Self {
        Self { sources, client }
    }

    /// Build the chain described by the configuration, using HTTP
    pub fn from_config(config: &NewsConfig) -> Result<Self> {
        let client: Arc<dyn SourceClient> = Arc::new(HttpSourceClient::new(config)?);
        Self::from_config_with_client(config, client)
    }

    /// Build the configured chain on top of an arbitrary client
    pub fn from_config_with_client(
        config: &NewsConfig,
        client: Arc<dyn SourceClient>,
    ) -> Result<Self> {
        let feed_parser: Arc<dyn NewsParser> = Arc::new(FeedParser::new(config.max_items));
        let html_parser: Arc<dyn NewsParser> =
            Arc::new(HtmlParser::new(&config.site_origin, config.max_items)?);

        let sources = config
            .sources
            .iter()
            .map(|s| {
                let parser = match s.kind {
                    SourceKind::Feed => feed_parser.clone(),
                    SourceKind::Html => html_parser.clone(),
                };
                NewsSource::new(&s.label, &s.url, s.kind, parser)
            })
            .collect();

        Ok(Self::new(sources, client))
    }

    /// Try every source in order; `None` when all of them fail or come back empty
    pub async fn fetch(&self) -> Option<FetchedBatch> {
        for source in &self.sources {
            tracing::info!("Trying source '{}': {}", source.label, source.url);

            let body = match self.client.get_text(&source.url, source.kind).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Source '{}' failed: {}", source.label, e);
                    continue;
                }
            };

            let raw = source.parser.parse(&body);
            if raw.is_empty() {
                tracing::warn!("Source '{}' returned no usable items", source.label);
                continue;
            }

            let fetched_at = Utc::now();
            let items: Vec<NewsItem> = raw
                .into_iter()
                .map(|r| NewsItem::from_raw(r, fetched_at))
                .collect();

            tracing::info!("Source '{}' returned {} items", source.label, items.len());
            return Some(FetchedBatch {
                items,
                source_label: source.label.clone(),
            });
        }

        None
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn chain(client: Arc<ScriptedClient>) -> FetchChain {
        FetchChain::from_config_with_client(&test_config(), client).unwrap()
    }

    #[tokio::test]
    async fn test_first_source_wins() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(DIRECT, &feed_with(&[("Primeira notícia do dia", 1)]));
        client.respond(PROXY_RSS, &feed_with(&[("Notícia vinda do proxy", 2)]));

        let batch = chain(client.clone()).fetch().await.unwrap();
        assert_eq!(batch.source_label, "direct");
        assert_eq!(batch.items[0].external_id, "1");
        assert_eq!(client.calls(), vec![DIRECT.to_string()]);
    }

    #[tokio::test]
    async fn test_falls_back_in_order() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(PROXY_RSS, &feed_with(&[("Notícia vinda do proxy", 2)]));

        let batch = chain(client.clone()).fetch().await.unwrap();
        assert_eq!(batch.source_label, "proxy-rss");
        assert_eq!(client.calls(), vec![DIRECT.to_string(), PROXY_RSS.to_string()]);
    }

    #[tokio::test]
    async fn test_empty_parse_counts_as_failure() {
        let client = Arc::new(ScriptedClient::new());
        client.respond(DIRECT, "<rss><channel></channel></rss>");
        client.respond(PROXY_RSS, &feed_with(&[("Curta", 3)]));
        client.respond(
            PROXY_HTML,
            "[Audiência pública sobre mediação ----](https://www.tjes.jus.br/audiencia-publica/)",
        );

        let batch = chain(client.clone()).fetch().await.unwrap();
        assert_eq!(batch.source_label, "proxy-html");
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].external_id, "audiencia-publica");
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_none() {
        let client = Arc::new(ScriptedClient::new());
        assert!(chain(client.clone()).fetch().await.is_none());
        assert_eq!(
            client.calls(),
            vec![DIRECT.to_string(), PROXY_RSS.to_string(), PROXY_HTML.to_string()]
        );
    }
}
