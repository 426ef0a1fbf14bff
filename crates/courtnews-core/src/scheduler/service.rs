use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::news::{NewsPipeline, RunOutcome};
use crate::Result;

/// First occurrence of wall-clock `at` (in `offset`) strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, offset: FixedOffset) -> DateTime<Utc> {
    let local_day = now.with_timezone(&offset).date_naive();
    let local_target = local_day.and_time(at);
    let utc_target = local_target - Duration::seconds(i64::from(offset.local_minus_utc()));

    let candidate = Utc.from_utc_datetime(&utc_target);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Daily news refresh, plus an optional warm-up run at startup
pub struct SchedulerService {
    pipeline: Arc<NewsPipeline>,
    enabled: bool,
    run_on_startup: bool,
    daily_at: NaiveTime,
    offset: FixedOffset,
}

impl SchedulerService {
    pub fn new(pipeline: Arc<NewsPipeline>, config: &ScheduleConfig) -> Result<Self> {
        Ok(Self {
            pipeline,
            enabled: config.enabled,
            run_on_startup: config.run_on_startup,
            daily_at: config.daily_time()?,
            offset: config.offset()?,
        })
    }

    async fn run_once(&self, trigger: &'static str) -> RunOutcome {
        debug!("Running {} news refresh", trigger);
        let outcome = self.pipeline.run().await;
        match &outcome {
            RunOutcome::Saved { count, source } => {
                info!("{} refresh: {} news saved from '{}'", trigger, count, source);
            }
            RunOutcome::Skipped { until } => {
                info!("{} refresh skipped, backoff until {}", trigger, until);
            }
            RunOutcome::AlreadyRunning => {
                info!("{} refresh skipped, another run in progress", trigger);
            }
            RunOutcome::Failed => {
                error!("{} refresh failed: all sources failed", trigger);
            }
        }
        outcome
    }

    /// Run until the shutdown flag flips to `true` or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.enabled {
            info!("News scheduler disabled");
            let _ = shutdown.changed().await;
            return;
        }

        info!(
            "Scheduler started: daily at {} (UTC{})",
            self.daily_at.format("%H:%M"),
            self.offset
        );

        if self.run_on_startup {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("Scheduler received shutdown signal");
                    return;
                }
                _ = self.run_once("startup") => {}
            }
        }

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.daily_at, self.offset);
            let wait = (next - now).to_std().unwrap_or_default();
            info!("Next news refresh at {}", next.with_timezone(&self.offset));

            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = tokio::time::sleep(wait) => {
                    self.run_once("scheduled").await;
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::testing::*;
    use crate::news::{FailureTracker, FetchChain};
    use crate::storage::{Database, NewsRepository, NewsStore};
    use std::time::Duration as StdDuration;
    use tokio::time::timeout;

    fn brt() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        // 08:00 in Brasília
        let now = Utc.with_ymd_and_hms(2024, 12, 5, 11, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine(), brt()),
            Utc.with_ymd_and_hms(2024, 12, 5, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        let at_nine = Utc.with_ymd_and_hms(2024, 12, 5, 12, 0, 0).unwrap();
        assert_eq!(
            next_run_after(at_nine, nine(), brt()),
            Utc.with_ymd_and_hms(2024, 12, 6, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_run_uses_local_day() {
        // 23:30 on the 4th in Brasília, already the 5th in UTC
        let now = Utc.with_ymd_and_hms(2024, 12, 5, 2, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine(), brt()),
            Utc.with_ymd_and_hms(2024, 12, 5, 12, 0, 0).unwrap()
        );
    }

    struct Fixture {
        service: SchedulerService,
        client: Arc<ScriptedClient>,
        store: Arc<NewsRepository>,
    }

    async fn scheduler(config: ScheduleConfig) -> Fixture {
        let client = Arc::new(ScriptedClient::new());
        let chain = FetchChain::from_config_with_client(&test_config(), client.clone()).unwrap();
        let store = Arc::new(NewsRepository::new(Database::new_in_memory().await.unwrap()));
        let pipeline = Arc::new(NewsPipeline::new(
            chain,
            store.clone(),
            FailureTracker::new(3, 6),
        ));
        Fixture {
            service: SchedulerService::new(pipeline, &config).unwrap(),
            client,
            store,
        }
    }

    #[tokio::test]
    async fn test_startup_run_then_shutdown() {
        let f = scheduler(ScheduleConfig::default()).await;
        f.client
            .respond(DIRECT, &feed_with(&[("Notícia carregada na partida", 1)]));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(f.service.run(shutdown_rx));

        let stored = timeout(StdDuration::from_secs(5), async {
            while f.store.count_active().await.unwrap() == 0 {
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
        })
        .await;
        assert!(stored.is_ok());
        assert_eq!(f.client.calls(), vec![DIRECT.to_string()]);

        shutdown_tx.send(true).unwrap();
        assert!(timeout(StdDuration::from_secs(1), handle).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_waits_for_shutdown() {
        let config = ScheduleConfig {
            enabled: false,
            ..ScheduleConfig::default()
        };
        let f = scheduler(config).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(f.service.run(shutdown_rx));
        shutdown_tx.send(true).unwrap();

        assert!(timeout(StdDuration::from_secs(1), handle).await.is_ok());
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_reports_failure() {
        let f = scheduler(ScheduleConfig::default()).await;
        assert_eq!(f.service.run_once("manual").await, RunOutcome::Failed);
        assert_eq!(f.client.calls().len(), 3);
    }
}
