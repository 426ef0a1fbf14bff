use std::sync::Arc;

use anyhow::{bail, Result};

use courtnews_core::{
    news::{NewsPipeline, RunOutcome},
    storage::{Database, NewsRepository},
    AppConfig,
};

pub async fn run(db: Database, config: &AppConfig) -> Result<()> {
    println!("Fetching news from {} sources...\n", config.news.sources.len());

    let pipeline = NewsPipeline::from_config(&config.news, Arc::new(NewsRepository::new(db)))?;

    match pipeline.run().await {
        RunOutcome::Saved { count, source } => {
            println!("\nRefresh complete. {} news saved from '{}'.", count, source);
            Ok(())
        }
        outcome => {
            let report = outcome.report();
            bail!(
                "refresh failed: {}",
                report.error.unwrap_or_else(|| "unknown error".to_string())
            )
        }
    }
}
