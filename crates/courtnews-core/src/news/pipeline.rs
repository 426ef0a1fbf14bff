use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::chain::FetchChain;
use super::tracker::{FailureTracker, FetchStatus, TrackerState};
use crate::config::NewsConfig;
use crate::storage::NewsStore;
use crate::Result;

/// Result of a single pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A source produced items; `count` of them were written
    Saved { count: usize, source: String },
    /// Backoff is active, nothing was attempted
    Skipped { until: DateTime<Utc> },
    /// Another run held the guard
    AlreadyRunning,
    /// Every source failed or came back empty
    Failed,
}

impl RunOutcome {
    pub fn is_skip(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. } | RunOutcome::AlreadyRunning)
    }

    pub fn report(&self) -> RunReport {
        match self {
            RunOutcome::Saved { count, source } => RunReport {
                success: true,
                count: *count,
                error: None,
                source: Some(source.clone()),
                skipped: false,
            },
            RunOutcome::Skipped { .. } => RunReport::failure("backoff active", true),
            RunOutcome::AlreadyRunning => RunReport::failure("refresh already running", true),
            RunOutcome::Failed => RunReport::failure("all sources failed", false),
        }
    }
}

/// Serializable summary of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub skipped: bool,
}

impl RunReport {
    fn failure(error: &str, skipped: bool) -> Self {
        Self {
            success: false,
            count: 0,
            error: Some(error.to_string()),
            source: None,
            skipped,
        }
    }
}

/// Clears the running flag when a run ends, whichever way it ends
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fetch chain, failure tracker and store wired into one run.
///
/// A run never returns an error: source failures feed the tracker and
/// per-item write failures are logged and skipped.
pub struct NewsPipeline {
    chain: FetchChain,
    store: Arc<dyn NewsStore>,
    tracker: Mutex<FailureTracker>,
    running: AtomicBool,
}

impl NewsPipeline {
    pub fn new(chain: FetchChain, store: Arc<dyn NewsStore>, tracker: FailureTracker) -> Self {
        Self {
            chain,
            store,
            tracker: Mutex::new(tracker),
            running: AtomicBool::new(false),
        }
    }

    /// HTTP chain and tracker policy taken from the configuration
    pub fn from_config(config: &NewsConfig, store: Arc<dyn NewsStore>) -> Result<Self> {
        let chain = FetchChain::from_config(config)?;
        let tracker = FailureTracker::new(config.failure_threshold, config.backoff_hours);
        Ok(Self::new(chain, store, tracker))
    }

    fn tracker(&self) -> MutexGuard<'_, FailureTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fetch_status(&self) -> FetchStatus {
        self.tracker().status()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn run(&self) -> RunOutcome {
        self.run_with_clock(Utc::now).await
    }

    /// Run once with `now` as the clock reading for the tracker
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunOutcome {
        self.run_with_clock(move || now).await
    }

    /// The clock is read once before fetching and again when every source
    /// has failed, so a failure is stamped when the chain gave up
    async fn run_with_clock<C>(&self, clock: C) -> RunOutcome
    where
        C: Fn() -> DateTime<Utc> + Send + Sync,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("News refresh already in progress, skipping");
            return RunOutcome::AlreadyRunning;
        }
        let _guard = RunGuard(&self.running);

        let state = self.tracker().state(clock());
        if let TrackerState::Backoff { until } = state {
            tracing::info!("News fetch in backoff until {}, skipping", until);
            return RunOutcome::Skipped { until };
        }

        let batch = match self.chain.fetch().await {
            Some(batch) => batch,
            None => {
                let failures = {
                    let mut tracker = self.tracker();
                    tracker.record_failure(clock());
                    tracker.consecutive_failures()
                };
                tracing::warn!(
                    "All news sources failed ({} consecutive failures)",
                    failures
                );
                return RunOutcome::Failed;
            }
        };

        self.tracker().record_success();

        let mut saved = 0;
        for item in &batch.items {
            match self.store.upsert(item).await {
                Ok(()) => saved += 1,
                Err(e) => {
                    tracing::warn!("Failed to save news item {}: {}", item.external_id, e);
                }
            }
        }

        tracing::info!(
            "Saved {}/{} news items from '{}'",
            saved,
            batch.items.len(),
            batch.source_label
        );

        RunOutcome::Saved {
            count: saved,
            source: batch.source_label,
        }
    }
}
