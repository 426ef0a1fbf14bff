use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use courtnews_core::{
    api::{self, AppState},
    news::{NewsPipeline, NewsQuery},
    scheduler::SchedulerService,
    storage::{Database, NewsRepository, NewsStore},
    AppConfig,
};

/// Flip `tx` once `signal` fires. A handler that failed to install never does.
async fn forward_shutdown<F>(signal: F, tx: watch::Sender<bool>)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received shutdown signal");
            let _ = tx.send(true);
        }
        Err(e) => warn!("Could not listen for ctrl-c, stop the server another way: {}", e),
    }
}

pub async fn run(db: Database, config: Arc<AppConfig>) -> Result<()> {
    let store: Arc<dyn NewsStore> = Arc::new(NewsRepository::new(db));
    let pipeline = Arc::new(NewsPipeline::from_config(&config.news, store.clone())?);
    let query = Arc::new(NewsQuery::from_config(&config, store)?);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(forward_shutdown(tokio::signal::ctrl_c(), shutdown_tx.clone()));

    let scheduler = SchedulerService::new(pipeline.clone(), &config.schedule)?;
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let listener = TcpListener::bind(&config.server.bind_addr).await?;
    let router = api::router(
        AppState::new(pipeline, query, &config),
        &config.server.allowed_origins,
    );

    println!(
        "Serving news on http://{} ({})",
        config.server.bind_addr, config.general.environment
    );
    println!("  Daily refresh: {}", config.schedule.daily_at);
    println!("  Allowed origins: {}", config.server.allowed_origins.join(", "));

    let served = api::serve(listener, router, shutdown_rx).await;

    // Stop the scheduler too if the server ended on its own
    let _ = shutdown_tx.send(true);
    scheduler_task.await?;

    served?;
    println!("Server stopped.");
    Ok(())
}
