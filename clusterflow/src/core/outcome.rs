//! Watch targets and the outcome a watch produces.

use super::{ResourceKind, TerminalState};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifies the resource a watch observes.
///
/// A target is fixed for the lifetime of a watch; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    kind: ResourceKind,
    namespace: String,
    name: String,
    timeout: Duration,
}

impl WatchTarget {
    /// Creates a target for an arbitrary kind.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            timeout,
        }
    }

    /// Creates a pod target.
    #[must_use]
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>, timeout: Duration) -> Self {
        Self::new(ResourceKind::Pod, namespace, name, timeout)
    }

    /// Creates a job target.
    #[must_use]
    pub fn job(namespace: impl Into<String>, name: impl Into<String>, timeout: Duration) -> Self {
        Self::new(ResourceKind::Job, namespace, name, timeout)
    }

    /// The resource kind.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How long the watch may run before resolving as timed out.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// The single result of a watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutcome {
    /// Whether the terminal state counts as success.
    pub succeeded: bool,
    /// How the watch ended.
    pub terminal_state: TerminalState,
    /// Human-readable summary.
    pub message: String,
    /// Last observed pod phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_phase: Option<String>,
    /// Job succeeded pod count at resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub succeeded_count: Option<u32>,
    /// Job failed pod count at resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<u32>,
}

impl WatchOutcome {
    /// Creates an outcome for the given terminal state.
    #[must_use]
    pub fn new(terminal_state: TerminalState, message: impl Into<String>) -> Self {
        Self {
            succeeded: terminal_state.is_success(),
            terminal_state,
            message: message.into(),
            final_phase: None,
            succeeded_count: None,
            failed_count: None,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TerminalState::Failed, message)
    }

    /// Creates the outcome produced when the deadline passes.
    #[must_use]
    pub fn timed_out(target: &WatchTarget) -> Self {
        let seconds = target.timeout().as_secs_f64();
        let message = match target.kind() {
            ResourceKind::Pod => format!("Pod did not become ready within {seconds}s"),
            ResourceKind::Job => format!("Job did not complete within {seconds}s"),
            other => format!("{other} did not reach a terminal state within {seconds}s"),
        };
        Self::new(TerminalState::TimedOut, message)
    }

    /// Sets the pod phase.
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.final_phase = Some(phase.into());
        self
    }

    /// Sets the job counters.
    #[must_use]
    pub fn with_counts(mut self, succeeded: u32, failed: u32) -> Self {
        self.succeeded_count = Some(succeeded);
        self.failed_count = Some(failed);
        self
    }
}
