use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use courtnews_core::{
    news::NewsQuery,
    scheduler::next_run_after,
    storage::{Database, NewsRepository},
    AppConfig,
};

pub async fn run(db: Database, config: &AppConfig) -> Result<()> {
    let query = NewsQuery::from_config(config, Arc::new(NewsRepository::new(db)))?;
    let offset = config.schedule.offset()?;

    println!("Database: {}", config.database_path().display());
    println!("Active news: {}", query.count_active().await);
    match query.last_fetch_time().await {
        Some(at) => println!("Last fetch: {}", at.with_timezone(&offset).format("%Y-%m-%d %H:%M")),
        None => println!("Last fetch: never"),
    }

    println!("\nSources (tried in order):");
    for source in &config.news.sources {
        println!("  {} [{:?}] {}", source.label, source.kind, source.url);
    }

    if config.schedule.enabled {
        let next = next_run_after(Utc::now(), config.schedule.daily_time()?, offset);
        println!(
            "\nNext scheduled refresh: {}",
            next.with_timezone(&offset).format("%Y-%m-%d %H:%M")
        );
    } else {
        println!("\nScheduled refresh disabled.");
    }

    Ok(())
}
