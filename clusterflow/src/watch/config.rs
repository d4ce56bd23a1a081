//! Configuration for completion watches.

use crate::core::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Poll intervals and default deadlines per watchable kind.
///
/// A poll interval of `None` disables polling for that kind; the watch then
/// relies on the event stream alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Job poll interval in milliseconds.
    #[serde(default = "default_job_poll_ms")]
    pub job_poll_interval_ms: Option<u64>,
    /// Pod poll interval in milliseconds.
    #[serde(default = "default_pod_poll_ms")]
    pub pod_poll_interval_ms: Option<u64>,
    /// Job deadline in seconds when the caller gives none.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Pod deadline in seconds when the caller gives none.
    #[serde(default = "default_pod_timeout_secs")]
    pub pod_timeout_secs: u64,
}

#[allow(clippy::unnecessary_wraps)]
fn default_job_poll_ms() -> Option<u64> {
    Some(2000)
}

#[allow(clippy::unnecessary_wraps)]
fn default_pod_poll_ms() -> Option<u64> {
    Some(1000)
}

fn default_job_timeout_secs() -> u64 {
    300
}

fn default_pod_timeout_secs() -> u64 {
    120
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            job_poll_interval_ms: default_job_poll_ms(),
            pod_poll_interval_ms: default_pod_poll_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            pod_timeout_secs: default_pod_timeout_secs(),
        }
    }
}

impl WatchConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the job poll interval. `None` disables job polling.
    #[must_use]
    pub fn with_job_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.job_poll_interval_ms = interval.map(duration_millis);
        self
    }

    /// Sets the pod poll interval. `None` disables pod polling.
    #[must_use]
    pub fn with_pod_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.pod_poll_interval_ms = interval.map(duration_millis);
        self
    }

    /// Returns the poll interval for `kind`, if polling applies.
    #[must_use]
    pub fn poll_interval(&self, kind: ResourceKind) -> Option<Duration> {
        let millis = match kind {
            ResourceKind::Job => self.job_poll_interval_ms,
            ResourceKind::Pod => self.pod_poll_interval_ms,
            ResourceKind::PersistentVolumeClaim | ResourceKind::ConfigMap => None,
        };
        millis.filter(|ms| *ms > 0).map(Duration::from_millis)
    }

    /// Returns the default deadline for `kind`.
    #[must_use]
    pub fn default_timeout(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Pod => Duration::from_secs(self.pod_timeout_secs),
            _ => Duration::from_secs(self.job_timeout_secs),
        }
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
