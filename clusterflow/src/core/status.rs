//! Resource kind, terminal state and step status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of cluster resource an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A single pod.
    Pod,
    /// A batch job.
    Job,
    /// A persistent volume claim.
    PersistentVolumeClaim,
    /// A config map.
    ConfigMap,
}

impl ResourceKind {
    /// Returns the API version string used in manifests of this kind.
    #[must_use]
    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Job => "batch/v1",
            Self::Pod | Self::PersistentVolumeClaim | Self::ConfigMap => "v1",
        }
    }

    /// Returns true if resources of this kind have a completion state worth watching.
    #[must_use]
    pub fn is_watchable(&self) -> bool {
        matches!(self, Self::Pod | Self::Job)
    }

    /// Parses the `kind` field of a manifest.
    #[must_use]
    pub fn from_manifest_kind(kind: &str) -> Option<Self> {
        match kind {
            "Pod" => Some(Self::Pod),
            "Job" => Some(Self::Job),
            "PersistentVolumeClaim" => Some(Self::PersistentVolumeClaim),
            "ConfigMap" => Some(Self::ConfigMap),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pod => write!(f, "Pod"),
            Self::Job => write!(f, "Job"),
            Self::PersistentVolumeClaim => write!(f, "PersistentVolumeClaim"),
            Self::ConfigMap => write!(f, "ConfigMap"),
        }
    }
}

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminalState {
    /// A pod reached the `Running` phase.
    Ready,
    /// A pod or job ran to successful completion.
    Succeeded,
    /// The resource reported an authoritative failure, or could not be observed.
    Failed,
    /// No terminal state was observed before the deadline.
    TimedOut,
}

impl TerminalState {
    /// Returns true if the state counts as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ready | Self::Succeeded)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "Ready"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// The execution status of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step has not started.
    #[default]
    Pending,
    /// Step is creating or watching its resource.
    Running,
    /// Step finished successfully.
    Completed,
    /// Step failed.
    Failed,
}

impl StepStatus {
    /// Returns true if the status is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` keeps the status monotonic.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Pod.to_string(), "Pod");
        assert_eq!(ResourceKind::Job.to_string(), "Job");
        assert_eq!(
            ResourceKind::PersistentVolumeClaim.to_string(),
            "PersistentVolumeClaim"
        );
    }

    #[test]
    fn test_resource_kind_from_manifest() {
        assert_eq!(ResourceKind::from_manifest_kind("Job"), Some(ResourceKind::Job));
        assert_eq!(ResourceKind::from_manifest_kind("Deployment"), None);
        assert_eq!(ResourceKind::Job.api_version(), "batch/v1");
    }

    #[test]
    fn test_resource_kind_orders_as_map_key() {
        let mut keys = std::collections::BTreeMap::new();
        keys.insert((ResourceKind::ConfigMap, "ci".to_string()), 3);
        keys.insert((ResourceKind::Pod, "ci".to_string()), 1);
        keys.insert((ResourceKind::Job, "ci".to_string()), 2);

        let kinds: Vec<_> = keys.keys().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, vec![ResourceKind::Pod, ResourceKind::Job, ResourceKind::ConfigMap]);
        assert!(ResourceKind::Pod < ResourceKind::PersistentVolumeClaim);
    }

    #[test]
    fn test_terminal_state_success() {
        assert!(TerminalState::Ready.is_success());
        assert!(TerminalState::Succeeded.is_success());
        assert!(!TerminalState::Failed.is_success());
        assert!(!TerminalState::TimedOut.is_success());
    }

    #[test]
    fn test_step_status_transitions() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Running));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Failed));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Pending));
    }

    #[test]
    fn test_step_status_serialize() {
        let json = serde_json::to_string(&StepStatus::Completed).unwrap();
        assert_eq!(json, r#""completed""#);

        let back: StepStatus = serde_json::from_str(r#""pending""#).unwrap();
        assert_eq!(back, StepStatus::Pending);
    }
}
