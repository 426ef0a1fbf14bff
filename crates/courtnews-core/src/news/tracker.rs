use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Whether fetch attempts may proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Armed,
    Backoff { until: DateTime<Utc> },
}

/// Snapshot exposed by the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    pub consecutive_failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub backoff_hours: u32,
}

/// Counts consecutive failed runs and holds further attempts back for
/// `backoff_hours` once `threshold` is reached.
///
/// In-memory only; a process restart re-arms it.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    threshold: u32,
    backoff_hours: u32,
    consecutive_failures: u32,
    last_failure_time: Option<DateTime<Utc>>,
}

impl FailureTracker {
    pub fn new(threshold: u32, backoff_hours: u32) -> Self {
        Self {
            threshold,
            backoff_hours,
            consecutive_failures: 0,
            last_failure_time: None,
        }
    }

    fn backoff(&self) -> Duration {
        Duration::hours(i64::from(self.backoff_hours))
    }

    pub fn state(&self, now: DateTime<Utc>) -> TrackerState {
        match self.last_failure_time {
            Some(last) if self.consecutive_failures >= self.threshold => {
                let until = last + self.backoff();
                if now < until {
                    TrackerState::Backoff { until }
                } else {
                    TrackerState::Armed
                }
            }
            _ => TrackerState::Armed,
        }
    }

    pub fn should_skip(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state(now), TrackerState::Backoff { .. })
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_time = Some(now);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure_time = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_failure_time(&self) -> Option<DateTime<Utc>> {
        self.last_failure_time
    }

    pub fn status(&self) -> FetchStatus {
        FetchStatus {
            consecutive_failures: self.consecutive_failures,
            last_failure_time: self.last_failure_time,
            backoff_hours: self.backoff_hours,
        }
    }
}
