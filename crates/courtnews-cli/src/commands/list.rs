use std::sync::Arc;

use anyhow::Result;

use courtnews_core::{
    news::NewsQuery,
    storage::{Database, NewsRepository},
    AppConfig,
};

pub async fn run(db: Database, config: &AppConfig, limit: u32) -> Result<()> {
    let query = NewsQuery::from_config(config, Arc::new(NewsRepository::new(db)))?;
    let limit = limit.clamp(1, config.server.max_limit);

    if query.count_active().await == 0 {
        println!("No news stored yet, showing fallback entries.");
        println!("\nTo fetch news now, run:");
        println!("  courtnews refresh\n");
    }

    for news in query.get_active_news(limit).await {
        let category = news.category.as_deref().unwrap_or("-");
        println!("  [{}] {} ({})", news.date, news.title, category);
        println!("    {}", news.link);
    }

    Ok(())
}
