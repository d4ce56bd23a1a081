//! Core domain model types for clusterflow.
//!
//! This module contains the fundamental types used throughout the service:
//! - Resource kinds, terminal watch states and step statuses
//! - Watch targets and watch outcomes

mod outcome;
mod status;

pub use outcome::{WatchOutcome, WatchTarget};
pub use status::{ResourceKind, StepStatus, TerminalState};
