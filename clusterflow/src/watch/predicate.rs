//! Terminal-state predicates for watchable kinds.

use crate::cluster::{JobCounts, PodPhase, ResourceStatus};
use crate::core::{ResourceKind, TerminalState, WatchOutcome};
use tracing::warn;

/// Maps job counters to an outcome.
///
/// Any succeeded pod completes the job. A failed pod only fails the job once
/// nothing is active, since the controller may still be retrying.
#[must_use]
pub fn job_outcome(counts: JobCounts) -> Option<WatchOutcome> {
    let outcome = if counts.succeeded > 0 {
        WatchOutcome::new(TerminalState::Succeeded, "Job completed successfully")
    } else if counts.failed > 0 && counts.active == 0 {
        WatchOutcome::new(TerminalState::Failed, "Job failed after retries")
    } else {
        return None;
    };
    Some(outcome.with_counts(counts.succeeded, counts.failed))
}

/// Maps a pod phase to an outcome. `Running` counts as ready.
#[must_use]
pub fn pod_outcome(phase: PodPhase) -> Option<WatchOutcome> {
    let outcome = match phase {
        PodPhase::Running => WatchOutcome::new(TerminalState::Ready, format!("Pod reached {phase} state")),
        PodPhase::Succeeded => WatchOutcome::new(TerminalState::Succeeded, format!("Pod reached {phase} state")),
        PodPhase::Failed => WatchOutcome::new(TerminalState::Failed, "Pod failed to start"),
        PodPhase::Pending | PodPhase::Unknown => return None,
    };
    Some(outcome.with_phase(phase.to_string()))
}

/// Evaluates a status read for a target of `kind`.
///
/// Returns `None` while the resource is not terminal.
#[must_use]
pub fn evaluate(kind: ResourceKind, status: &ResourceStatus) -> Option<WatchOutcome> {
    match (kind, status) {
        (ResourceKind::Job, ResourceStatus::Job(counts)) => job_outcome(*counts),
        (ResourceKind::Pod, ResourceStatus::Pod { phase }) => pod_outcome(*phase),
        (ResourceKind::Job | ResourceKind::Pod, other) => {
            warn!(%kind, status = ?other, "status does not match watched kind");
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_with_active_pods_is_not_terminal() {
        assert!(job_outcome(JobCounts::new(1, 0, 2)).is_none());
    }

    #[test]
    fn test_job_failed_without_active_pods() {
        let outcome = job_outcome(JobCounts::new(0, 0, 2)).unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.message, "Job failed after retries");
        assert_eq!(outcome.failed_count, Some(2));
    }

    #[test]
    fn test_job_succeeded() {
        let outcome = job_outcome(JobCounts::new(0, 1, 0)).unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        assert!(outcome.succeeded);
        assert_eq!(outcome.succeeded_count, Some(1));

        // Success wins over earlier failed attempts.
        let retried = job_outcome(JobCounts::new(0, 1, 2)).unwrap();
        assert!(retried.succeeded);
    }

    #[test]
    fn test_job_running_is_not_terminal() {
        assert!(job_outcome(JobCounts::new(1, 0, 0)).is_none());
        assert!(job_outcome(JobCounts::default()).is_none());
    }

    #[test]
    fn test_pod_phases() {
        let running = pod_outcome(PodPhase::Running).unwrap();
        assert_eq!(running.terminal_state, TerminalState::Ready);
        assert_eq!(running.message, "Pod reached Running state");
        assert_eq!(running.final_phase.as_deref(), Some("Running"));

        let done = pod_outcome(PodPhase::Succeeded).unwrap();
        assert_eq!(done.terminal_state, TerminalState::Succeeded);

        let failed = pod_outcome(PodPhase::Failed).unwrap();
        assert!(!failed.succeeded);
        assert_eq!(failed.message, "Pod failed to start");

        assert!(pod_outcome(PodPhase::Pending).is_none());
        assert!(pod_outcome(PodPhase::Unknown).is_none());
    }

    #[test]
    fn test_mismatched_status_is_not_terminal() {
        let status = ResourceStatus::Pod { phase: PodPhase::Failed };
        assert!(evaluate(ResourceKind::Job, &status).is_none());
        assert!(evaluate(ResourceKind::Pod, &status).is_some());
    }
}
