//! Watch a pod or job until it reaches a terminal state.
//!
//! [`CompletionWatcher::watch_until_complete`] races four triggers for one
//! [`OutcomeSlot`]:
//!
//! 1. an immediate status read on entry
//! 2. a periodic status read
//! 3. change notifications from the [`EventStream`], each followed by a read
//! 4. a deadline timer
//!
//! Whichever trigger claims the slot first decides the outcome. The other
//! tasks are aborted, which also drops the event subscription.

mod config;
pub mod predicate;
mod slot;

pub use config::WatchConfig;
pub use slot::{OutcomeSlot, Trigger};

use crate::cluster::{EventStream, EventSubscription, ResourceStore};
use crate::core::{ResourceKind, WatchOutcome, WatchTarget};
use futures::StreamExt;
use slot::DisarmOnDrop;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Resolves watch targets into a single [`WatchOutcome`].
#[derive(Clone)]
pub struct CompletionWatcher {
    store: Arc<dyn ResourceStore>,
    events: Arc<dyn EventStream>,
    config: WatchConfig,
}

impl std::fmt::Debug for CompletionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CompletionWatcher {
    /// Creates a watcher over the given store and event stream.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>, events: Arc<dyn EventStream>, config: WatchConfig) -> Self {
        Self { store, events, config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Builds a target, using the configured deadline when `timeout` is `None`.
    #[must_use]
    pub fn target(
        &self,
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        timeout: Option<Duration>,
    ) -> WatchTarget {
        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout(kind));
        WatchTarget::new(kind, namespace, name, timeout)
    }

    /// Watches a pod until it is running, has succeeded or has failed.
    pub async fn watch_pod(&self, namespace: &str, name: &str, timeout: Option<Duration>) -> WatchOutcome {
        let target = self.target(ResourceKind::Pod, namespace, name, timeout);
        self.watch_until_complete(&target).await
    }

    /// Watches a job until it has succeeded or has failed.
    pub async fn watch_job(&self, namespace: &str, name: &str, timeout: Option<Duration>) -> WatchOutcome {
        let target = self.target(ResourceKind::Job, namespace, name, timeout);
        self.watch_until_complete(&target).await
    }

    /// Resolves exactly once with the first terminal state observed, or with
    /// `TimedOut` once the target's deadline passes.
    ///
    /// Never fails: read errors are logged and retried by the next trigger.
    /// Dropping the returned future aborts every trigger task.
    pub async fn watch_until_complete(&self, target: &WatchTarget) -> WatchOutcome {
        let deadline = deadline_after(Instant::now(), target.timeout());
        debug!(%target, timeout = ?target.timeout(), "starting watch");

        match tokio::time::timeout_at(deadline, check(self.store.as_ref(), target, Trigger::Immediate)).await {
            Ok(Some(outcome)) => {
                info!(%target, trigger = %Trigger::Immediate, state = %outcome.terminal_state, "watch resolved");
                return outcome;
            }
            Ok(None) => {}
            Err(_) => {
                warn!(%target, "entry status read outlived the deadline");
                return WatchOutcome::timed_out(target);
            }
        }

        let subscribe = self.events.subscribe(target.namespace(), target.kind());
        let subscription = match tokio::time::timeout_at(deadline, subscribe).await {
            Ok(Ok(subscription)) => Some(subscription),
            Ok(Err(err)) => {
                warn!(%target, error = %err, "event subscription failed, falling back to polling");
                None
            }
            Err(_) => {
                warn!(%target, "event subscription outlived the deadline");
                return WatchOutcome::timed_out(target);
            }
        };
        let poll_interval = self.config.poll_interval(target.kind());

        if subscription.is_none() && poll_interval.is_none() {
            warn!(%target, "no event stream and polling disabled");
            return WatchOutcome::failed(format!(
                "Could not establish observation of {target}: event stream unavailable and polling disabled"
            ));
        }

        let (slot, receiver) = OutcomeSlot::new();
        let _guard = DisarmOnDrop(Arc::clone(&slot));

        if let Some(subscription) = subscription {
            let handle = tokio::spawn(listen(
                subscription,
                Arc::clone(&self.store),
                target.clone(),
                Arc::clone(&slot),
            ));
            slot.arm(Trigger::Stream, handle.abort_handle());
        }

        if let Some(interval) = poll_interval {
            let handle = tokio::spawn(poll(
                interval,
                Arc::clone(&self.store),
                target.clone(),
                Arc::clone(&slot),
            ));
            slot.arm(Trigger::Poll, handle.abort_handle());
        }

        let handle = tokio::spawn(expire(deadline, target.clone(), Arc::clone(&slot)));
        slot.arm(Trigger::Timeout, handle.abort_handle());

        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => WatchOutcome::failed(format!("Watch of {target} ended without an outcome")),
        }
    }
}

// Used when `start + timeout` does not fit the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

async fn check(store: &dyn ResourceStore, target: &WatchTarget, trigger: Trigger) -> Option<WatchOutcome> {
    match store.read(target.namespace(), target.kind(), target.name()).await {
        Ok(resource) => predicate::evaluate(target.kind(), &resource.status),
        Err(err) => {
            warn!(%target, %trigger, error = %err, "status read failed");
            None
        }
    }
}

fn claim(slot: &OutcomeSlot, target: &WatchTarget, trigger: Trigger, outcome: WatchOutcome) {
    let state = outcome.terminal_state;
    if slot.resolve(trigger, outcome) {
        info!(%target, %trigger, %state, "watch resolved");
    } else {
        debug!(%target, %trigger, "watch already resolved");
    }
}

async fn listen(
    mut subscription: EventSubscription,
    store: Arc<dyn ResourceStore>,
    target: WatchTarget,
    slot: Arc<OutcomeSlot>,
) {
    // Catch a transition that landed between the entry read and the subscription.
    if let Some(outcome) = check(store.as_ref(), &target, Trigger::Stream).await {
        claim(&slot, &target, Trigger::Stream, outcome);
        return;
    }

    while let Some(item) = subscription.next().await {
        match item {
            Ok(event) if event.name == target.name() => {
                debug!(%target, change = %event.change, "change notification");
                if let Some(outcome) = check(store.as_ref(), &target, Trigger::Stream).await {
                    claim(&slot, &target, Trigger::Stream, outcome);
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%target, error = %err, "event stream error"),
        }
    }
    debug!(%target, "event stream ended");
}

async fn poll(interval: Duration, store: Arc<dyn ResourceStore>, target: WatchTarget, slot: Arc<OutcomeSlot>) {
    let mut ticker = tokio::time::interval_at(deadline_after(Instant::now(), interval), interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Some(outcome) = check(store.as_ref(), &target, Trigger::Poll).await {
            claim(&slot, &target, Trigger::Poll, outcome);
            return;
        }
    }
}

async fn expire(deadline: Instant, target: WatchTarget, slot: Arc<OutcomeSlot>) {
    tokio::time::sleep_until(deadline).await;
    let outcome = WatchOutcome::timed_out(&target);
    claim(&slot, &target, Trigger::Timeout, outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{
        InMemoryCluster, JobCounts, JobManifest, Manifest, PodManifest, PodPhase, Resource, ResourceStatus,
    };
    use crate::core::TerminalState;
    use crate::errors::ClusterError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to an in-memory cluster, hanging the first read and/or
    /// the first subscribe for an hour.
    struct StallingCluster {
        inner: InMemoryCluster,
        stall_read: AtomicBool,
        stall_subscribe: AtomicBool,
    }

    impl StallingCluster {
        fn new(inner: &InMemoryCluster, stall_read: bool, stall_subscribe: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: inner.clone(),
                stall_read: AtomicBool::new(stall_read),
                stall_subscribe: AtomicBool::new(stall_subscribe),
            })
        }

        async fn maybe_stall(flag: &AtomicBool) {
            if flag.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    #[async_trait]
    impl ResourceStore for StallingCluster {
        async fn create(&self, namespace: &str, manifest: &Manifest) -> Result<Resource, ClusterError> {
            self.inner.create(namespace, manifest).await
        }

        async fn read(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<Resource, ClusterError> {
            Self::maybe_stall(&self.stall_read).await;
            self.inner.read(namespace, kind, name).await
        }

        async fn delete(&self, namespace: &str, kind: ResourceKind, name: &str) -> Result<(), ClusterError> {
            self.inner.delete(namespace, kind, name).await
        }

        async fn list(&self, kind: ResourceKind) -> Result<Vec<Resource>, ClusterError> {
            self.inner.list(kind).await
        }
    }

    #[async_trait]
    impl EventStream for StallingCluster {
        async fn subscribe(&self, namespace: &str, kind: ResourceKind) -> Result<EventSubscription, ClusterError> {
            Self::maybe_stall(&self.stall_subscribe).await;
            self.inner.subscribe(namespace, kind).await
        }
    }

    fn watcher(cluster: &InMemoryCluster, config: WatchConfig) -> CompletionWatcher {
        let cluster = Arc::new(cluster.clone());
        CompletionWatcher::new(cluster.clone(), cluster, config)
    }

    fn seeded(kind: ResourceKind, name: &str, status: ResourceStatus) -> Resource {
        Resource {
            kind,
            namespace: "ci".to_string(),
            name: name.to_string(),
            created_at: None,
            labels: BTreeMap::new(),
            status,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_resolves_without_subscribing() {
        let cluster = InMemoryCluster::new();
        cluster.insert(seeded(ResourceKind::Job, "done", ResourceStatus::Job(JobCounts::new(0, 1, 0))));

        let outcome = watcher(&cluster, WatchConfig::default())
            .watch_job("ci", "done", None)
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        assert_eq!(outcome.succeeded_count, Some(1));
        assert_eq!(cluster.subscriptions_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pod_resolves_without_subscribing() {
        let cluster = InMemoryCluster::new();
        cluster.insert(seeded(ResourceKind::Pod, "web", ResourceStatus::Pod { phase: PodPhase::Failed }));

        let outcome = watcher(&cluster, WatchConfig::default())
            .watch_pod("ci", "web", None)
            .await;

        assert!(!outcome.succeeded);
        assert_eq!(outcome.message, "Pod failed to start");
        assert_eq!(cluster.subscriptions_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_stream_resolves_when_polling_disabled() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("build", "bash").build()).await.unwrap();

        let config = WatchConfig::new().with_job_poll_interval(None);
        let watcher = watcher(&cluster, config);
        let watch = tokio::spawn(async move { watcher.watch_job("ci", "build", None).await });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cluster.active_subscriptions(), 1);
        cluster.update_status("ci", ResourceKind::Job, "build", ResourceStatus::Job(JobCounts::new(0, 1, 0)));

        let outcome = watch.await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
        assert_eq!(outcome.message, "Job completed successfully");

        settle().await;
        assert_eq!(cluster.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_only_when_subscription_fails() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &PodManifest::new("web", "nginx").build()).await.unwrap();
        cluster.refuse_subscriptions(true);

        let watcher = watcher(&cluster, WatchConfig::default());
        let started = Instant::now();
        let watch = tokio::spawn(async move { watcher.watch_pod("ci", "web", None).await });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        cluster.update_status_silently("ci", ResourceKind::Pod, "web", ResourceStatus::Pod { phase: PodPhase::Running });

        let outcome = watch.await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Ready);
        assert_eq!(outcome.final_phase.as_deref(), Some("Running"));
        assert!(started.elapsed() <= Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_observation_possible_fails_immediately() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("build", "bash").build()).await.unwrap();
        cluster.refuse_subscriptions(true);

        let started = Instant::now();
        let outcome = watcher(&cluster, WatchConfig::new().with_job_poll_interval(None))
            .watch_job("ci", "build", None)
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert!(outcome.message.starts_with("Could not establish observation of Job ci/build"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("stuck", "bash").build()).await.unwrap();

        let watcher = watcher(&cluster, WatchConfig::default());
        let started = Instant::now();
        let outcome = watcher.watch_job("ci", "stuck", Some(Duration::from_secs(10))).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.terminal_state, TerminalState::TimedOut);
        assert_eq!(outcome.message, "Job did not complete within 10s");
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(12));

        settle().await;
        assert_eq!(cluster.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_are_not_terminal() {
        let cluster = InMemoryCluster::new();
        cluster.insert(seeded(ResourceKind::Job, "flaky", ResourceStatus::Job(JobCounts::new(0, 0, 1))));
        cluster.fail_next_reads(3);

        let outcome = watcher(&cluster, WatchConfig::default())
            .watch_job("ci", "flaky", Some(Duration::from_secs(60)))
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert_eq!(outcome.message, "Job failed after retries");
        assert!(cluster.read_count() >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_resource_keeps_watching() {
        let cluster = InMemoryCluster::new();
        let watcher = watcher(&cluster, WatchConfig::default());
        let watch = tokio::spawn(async move { watcher.watch_pod("ci", "late", None).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cluster.insert(seeded(ResourceKind::Pod, "late", ResourceStatus::Pod { phase: PodPhase::Succeeded }));

        let outcome = watch.await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_failure_waits_for_active_pods() {
        let cluster = InMemoryCluster::new();
        cluster.script(
            ResourceKind::Job,
            "retrying",
            vec![
                (Duration::from_secs(3), ResourceStatus::Job(JobCounts::new(1, 0, 2))),
                (Duration::from_secs(3), ResourceStatus::Job(JobCounts::new(0, 0, 3))),
            ],
        );
        cluster.create("ci", &JobManifest::new("retrying", "bash").build()).await.unwrap();

        let started = Instant::now();
        let outcome = watcher(&cluster, WatchConfig::default())
            .watch_job("ci", "retrying", None)
            .await;

        assert_eq!(outcome.terminal_state, TerminalState::Failed);
        assert_eq!(outcome.failed_count, Some(3));
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_watch_aborts_triggers() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("long", "bash").build()).await.unwrap();
        let watcher = watcher(&cluster, WatchConfig::default());

        let result = tokio::time::timeout(Duration::from_secs(5), watcher.watch_job("ci", "long", None)).await;
        assert!(result.is_err());

        settle().await;
        assert_eq!(cluster.active_subscriptions(), 0);

        let reads = cluster.read_count();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cluster.read_count(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_entry_read_still_times_out() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("slow", "bash").build()).await.unwrap();
        let stalling = StallingCluster::new(&cluster, true, false);
        let watcher = CompletionWatcher::new(stalling.clone(), stalling, WatchConfig::default());

        let started = Instant::now();
        let outcome = watcher.watch_job("ci", "slow", Some(Duration::from_secs(10))).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.terminal_state, TerminalState::TimedOut);
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_subscribe_still_times_out() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &PodManifest::new("web", "nginx").build()).await.unwrap();
        let stalling = StallingCluster::new(&cluster, false, true);
        let watcher = CompletionWatcher::new(stalling.clone(), stalling, WatchConfig::default());

        let started = Instant::now();
        let outcome = watcher.watch_pod("ci", "web", Some(Duration::from_secs(10))).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome.terminal_state, TerminalState::TimedOut);
        assert_eq!(outcome.message, "Pod did not become ready within 10s");
        assert!(elapsed < Duration::from_secs(12));
        assert_eq!(cluster.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_does_not_overflow() {
        let cluster = InMemoryCluster::new();
        cluster.create("ci", &JobManifest::new("forever", "bash").build()).await.unwrap();
        let watcher = watcher(&cluster, WatchConfig::default());
        let watch = tokio::spawn(async move {
            watcher
                .watch_job("ci", "forever", Some(Duration::from_secs(u64::MAX)))
                .await
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cluster.update_status("ci", ResourceKind::Job, "forever", ResourceStatus::Job(JobCounts::new(0, 1, 0)));

        let outcome = watch.await.unwrap();
        assert_eq!(outcome.terminal_state, TerminalState::Succeeded);
    }

    #[test]
    fn test_deadline_after_saturates() {
        let start = Instant::now();
        assert_eq!(deadline_after(start, Duration::from_secs(10)), start + Duration::from_secs(10));
        assert_eq!(deadline_after(start, Duration::from_secs(u64::MAX)), start + FAR_FUTURE);
    }
}
