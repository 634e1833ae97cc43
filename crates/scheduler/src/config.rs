use std::time::Duration;

/// Running tasks older than this are considered abandoned by their executor.
const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(300);

/// Period of the hanging task scan.
const DEFAULT_RESCHEDULE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub execution_timeout: Duration,
    pub reschedule_interval: Duration,
}

impl SchedulerConfig {
    pub fn new(execution_timeout: Duration, reschedule_interval: Duration) -> Self {
        Self {
            execution_timeout,
            reschedule_interval,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EXECUTION_TIMEOUT, DEFAULT_RESCHEDULE_INTERVAL)
    }
}
