//! Workflow lifecycle events.
//!
//! The provisioner and orchestrator report progress through an injected
//! [`EventSink`] in addition to their own `tracing` output.

mod event;
mod sink;

pub use event::WorkflowEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
