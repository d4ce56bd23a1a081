//! # Clusterflow
//!
//! Watch-until-complete primitives and sequential provisioning workflows
//! for Kubernetes workloads.
//!
//! Clusterflow provides:
//!
//! - **Completion watching**: resolve a pod or job exactly once as ready,
//!   succeeded, failed or timed out, combining an event stream with polling
//! - **Sequential workflows**: fail-fast step runs over rendered manifests
//! - **Project provisioning**: a shared claim and config map per project
//! - **HTTP surface**: resource endpoints and the validation workflow
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clusterflow::prelude::*;
//! use std::sync::Arc;
//!
//! let cluster = Arc::new(InMemoryCluster::new());
//! let watcher = CompletionWatcher::new(cluster.clone(), cluster.clone(), WatchConfig::default());
//!
//! let outcome = watcher.watch_job("default", "migrate", None).await;
//! if outcome.succeeded {
//!     println!("{}", outcome.message);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod telemetry;
pub mod templates;
pub mod watch;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cluster::{
        EventStream, InMemoryCluster, JobCounts, Manifest, PodPhase, Resource, ResourceStatus,
        ResourceStore,
    };
    pub use crate::config::ServiceConfig;
    pub use crate::core::{ResourceKind, StepStatus, TerminalState, WatchOutcome, WatchTarget};
    pub use crate::errors::{ClusterError, ClusterflowError, TemplateError, WorkflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::templates::{BuiltinTemplates, DirectoryTemplates, TemplateSource};
    pub use crate::watch::{CompletionWatcher, WatchConfig};
    pub use crate::workflow::{
        ResourceProvisioner, StepRunner, ValidationRequest, ValidationWorkflow, WorkflowOrchestrator,
        WorkflowResult, WorkflowStep,
    };
}

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
