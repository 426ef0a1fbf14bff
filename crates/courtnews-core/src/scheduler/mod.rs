mod service;

pub use service::{next_run_after, SchedulerService};
