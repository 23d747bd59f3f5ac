//! Periodic refresh of the dashboard snapshot.
//!
//! Each [`DataKind`] is fetched independently. A failed fetch is replaced by
//! synthetic data for that kind only, so consumers always have something to
//! show. Responses are ordered per kind with sequence numbers: a response is
//! applied only if no later request of the same kind has been applied
//! already. Once stopped, the poller never publishes again, even if a request
//! issued earlier completes afterwards.

use crate::api::models::SystemInfo;
use crate::api::MetricsSource;
use crate::config::schema::PollerConfig;
use crate::error::Result;
use crate::metrics::collector::{PollStats, PollStatsCollector};
use crate::metrics::fallback::FallbackGenerator;
use crate::metrics::snapshot::{
    ActivityLogEntry, DashboardSnapshot, ProcessingMetrics, ResourceMetrics, Slice,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    ProcessingMetrics,
    ActivityLogs,
    SystemInfo,
    Resources,
}

impl DataKind {
    pub const ALL: [DataKind; 4] = [
        DataKind::ProcessingMetrics,
        DataKind::ActivityLogs,
        DataKind::SystemInfo,
        DataKind::Resources,
    ];

    /// Refreshed on the metrics interval.
    pub const FAST: [DataKind; 2] = [DataKind::ProcessingMetrics, DataKind::ActivityLogs];

    /// Refreshed on the coarser resources interval.
    pub const SLOW: [DataKind; 2] = [DataKind::SystemInfo, DataKind::Resources];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataKind::ProcessingMetrics => "processing metrics",
            DataKind::ActivityLogs => "activity logs",
            DataKind::SystemInfo => "system info",
            DataKind::Resources => "resource metrics",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopped,
}

enum Refreshed {
    Processing(Slice<ProcessingMetrics>),
    Logs(Slice<Vec<ActivityLogEntry>>),
    System(Slice<SystemInfo>),
    Resources(Slice<ResourceMetrics>),
}

impl Refreshed {
    fn store(self, snapshot: &mut DashboardSnapshot) {
        match self {
            Refreshed::Processing(slice) => snapshot.processing = Some(slice),
            Refreshed::Logs(slice) => snapshot.activity_logs = Some(slice),
            Refreshed::System(slice) => snapshot.system_info = Some(slice),
            Refreshed::Resources(slice) => snapshot.resources = Some(slice),
        }
    }
}

struct Gate {
    state: PollerState,
    applied: [u64; 4],
}

struct Shared {
    source: Arc<dyn MetricsSource>,
    fallback: FallbackGenerator,
    stats: PollStatsCollector,
    gate: Mutex<Gate>,
    next_seq: [AtomicU64; 4],
    in_flight: [AtomicBool; 4],
    snapshot_tx: watch::Sender<DashboardSnapshot>,
    state_tx: watch::Sender<PollerState>,
    callbacks_enabled: Mutex<bool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Nothing guarded here can be left half-written by a panic.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    async fn refresh(&self, kind: DataKind) -> bool {
        let seq = self.next_seq[kind.index()].fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let refreshed = match kind {
            DataKind::ProcessingMetrics => Refreshed::Processing(self.settle(
                kind,
                self.source.fetch_processing_metrics().await,
                started,
                FallbackGenerator::processing_metrics,
            )),
            DataKind::ActivityLogs => Refreshed::Logs(self.settle(
                kind,
                self.source.fetch_activity_logs().await,
                started,
                FallbackGenerator::activity_logs,
            )),
            DataKind::SystemInfo => Refreshed::System(self.settle(
                kind,
                self.source.fetch_system_info().await,
                started,
                FallbackGenerator::system_info,
            )),
            DataKind::Resources => Refreshed::Resources(self.settle(
                kind,
                self.source.fetch_resources().await,
                started,
                FallbackGenerator::resources,
            )),
        };

        self.apply(kind, seq, refreshed)
    }

    fn settle<T>(
        &self,
        kind: DataKind,
        result: Result<T>,
        started: Instant,
        fallback: impl FnOnce(&FallbackGenerator) -> T,
    ) -> Slice<T> {
        match result {
            Ok(value) => {
                self.stats.record_remote(started.elapsed());
                Slice::remote(value)
            }
            Err(e) => {
                if e.is_unimplemented() {
                    log::debug!("No backend source for {} ({}), using fallback data", kind, e);
                } else {
                    log::warn!("Failed to fetch {}: {}; using fallback data", kind, e);
                }
                self.stats.record_fallback(started.elapsed());
                Slice::fallback(fallback(&self.fallback), &e)
            }
        }
    }

    fn apply(&self, kind: DataKind, seq: u64, refreshed: Refreshed) -> bool {
        let mut gate = lock(&self.gate);
        if gate.state == PollerState::Stopped {
            log::debug!("Discarding {} response #{} after stop", kind, seq);
            return false;
        }
        if seq <= gate.applied[kind.index()] {
            log::debug!(
                "Discarding stale {} response #{} (#{} already applied)",
                kind,
                seq,
                gate.applied[kind.index()]
            );
            self.stats.increment_stale_discarded();
            return false;
        }
        gate.applied[kind.index()] = seq;
        self.snapshot_tx.send_modify(|snapshot| refreshed.store(snapshot));
        true
    }

    fn finish_loading(&self) {
        let gate = lock(&self.gate);
        if gate.state != PollerState::Stopped {
            self.snapshot_tx.send_modify(|snapshot| snapshot.is_loading = false);
        }
    }

    fn set_state(&self, state: PollerState) -> PollerState {
        let previous = {
            let mut gate = lock(&self.gate);
            std::mem::replace(&mut gate.state, state)
        };
        self.state_tx.send_replace(state);
        previous
    }

    /// Starts a fetch of `kind` unless one issued by the timer is still running.
    fn spawn_refresh(self: &Arc<Self>, kind: DataKind) -> Option<JoinHandle<()>> {
        if self.in_flight[kind.index()].swap(true, Ordering::SeqCst) {
            log::debug!("Previous {} fetch still in flight, skipping tick", kind);
            self.stats.increment_ticks_skipped();
            return None;
        }
        let shared = self.clone();
        Some(tokio::spawn(async move {
            shared.refresh(kind).await;
            shared.in_flight[kind.index()].store(false, Ordering::SeqCst);
        }))
    }
}

/// Keeps a [`DashboardSnapshot`] refreshed from a [`MetricsSource`].
pub struct MetricsPoller {
    shared: Arc<Shared>,
    metrics_interval: Duration,
    resources_interval: Duration,
}

impl MetricsPoller {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        fallback: FallbackGenerator,
        config: &PollerConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(DashboardSnapshot::default());
        let (state_tx, _) = watch::channel(PollerState::Idle);

        Self {
            shared: Arc::new(Shared {
                source,
                fallback,
                stats: PollStatsCollector::new(),
                gate: Mutex::new(Gate {
                    state: PollerState::Idle,
                    applied: [0; 4],
                }),
                next_seq: Default::default(),
                in_flight: Default::default(),
                snapshot_tx,
                state_tx,
                callbacks_enabled: Mutex::new(true),
            }),
            metrics_interval: config.metrics_interval(),
            resources_interval: config.resources_interval(),
        }
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn stats(&self) -> PollStats {
        self.shared.stats.snapshot()
    }

    /// Fetches one kind now, outside the timer. Returns whether the result
    /// was applied to the snapshot.
    pub async fn refetch(&self, kind: DataKind) -> bool {
        if *self.shared.state_tx.borrow() == PollerState::Stopped {
            return false;
        }
        self.shared.refresh(kind).await
    }

    /// Fetches every kind concurrently, then refreshes them on their
    /// intervals. `callback` sees every published snapshot until the
    /// returned handle is stopped. It must not call [`PollerHandle::stop`]
    /// itself.
    pub fn start<F>(self, callback: F) -> PollerHandle
    where
        F: Fn(&DashboardSnapshot) + Send + Sync + 'static,
    {
        self.shared.set_state(PollerState::Running);
        log::info!(
            "Starting metrics poller (metrics every {:?}, resources every {:?})",
            self.metrics_interval,
            self.resources_interval
        );

        let mut tasks = Vec::with_capacity(2);

        let mut rx = self.shared.snapshot_tx.subscribe();
        let shared = self.shared.clone();
        tasks.push(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                let enabled = {
                    let enabled = lock(&shared.callbacks_enabled);
                    if *enabled {
                        callback(&snapshot);
                    }
                    *enabled
                };
                if !enabled {
                    break;
                }
            }
        }));

        let initial: Vec<JoinHandle<()>> = DataKind::ALL
            .into_iter()
            .filter_map(|kind| self.shared.spawn_refresh(kind))
            .collect();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            futures::future::join_all(initial).await;
            shared.finish_loading();
        });

        let shared = self.shared.clone();
        let (fast_period, slow_period) = (self.metrics_interval, self.resources_interval);
        tasks.push(tokio::spawn(async move {
            let now = tokio::time::Instant::now();
            let mut fast = interval_at(now + fast_period, fast_period);
            let mut slow = interval_at(now + slow_period, slow_period);
            fast.set_missed_tick_behavior(MissedTickBehavior::Delay);
            slow.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let kinds = tokio::select! {
                    _ = fast.tick() => DataKind::FAST,
                    _ = slow.tick() => DataKind::SLOW,
                };
                for kind in kinds {
                    shared.spawn_refresh(kind);
                }
            }
        }));

        PollerHandle {
            shared: self.shared,
            tasks: Mutex::new(tasks),
        }
    }
}

/// Controls a running poller. Dropping the handle stops polling.
pub struct PollerHandle {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PollerHandle {
    /// Cancels the timers. Safe to call more than once. After this returns
    /// the callback is not invoked again and the snapshot no longer changes.
    pub fn stop(&self) {
        if self.shared.set_state(PollerState::Stopped) == PollerState::Stopped {
            return;
        }
        // Waits for a callback that is running right now.
        *lock(&self.shared.callbacks_enabled) = false;
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        log::info!("Metrics poller stopped");
    }

    pub async fn refetch(&self, kind: DataKind) -> bool {
        if self.is_stopped() {
            return false;
        }
        self.shared.refresh(kind).await
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<PollerState> {
        self.shared.state_tx.subscribe()
    }

    pub fn state(&self) -> PollerState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PollerState::Stopped
    }

    pub fn stats(&self) -> PollStats {
        self.shared.stats.snapshot()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{FakeBackend, FakeFetch, FakeOutcome};
    use std::sync::atomic::AtomicUsize;

    fn config() -> PollerConfig {
        PollerConfig {
            metrics_interval_ms: 5_000,
            resources_interval_ms: 30_000,
            ..PollerConfig::default()
        }
    }

    fn poller(backend: &Arc<FakeBackend>) -> MetricsPoller {
        MetricsPoller::new(backend.clone(), FallbackGenerator::seeded(7, 8, 50_000), &config())
    }

    async fn loaded(handle: &PollerHandle) -> DashboardSnapshot {
        let mut rx = handle.subscribe();
        let snapshot = rx.wait_for(|s| !s.is_loading).await.unwrap().clone();
        snapshot
    }

    #[tokio::test(start_paused = true)]
    async fn failing_backend_still_yields_a_complete_snapshot() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_all_metrics("connection refused").await;

        let handle = poller(&backend).start(|_| {});
        let snapshot = loaded(&handle).await;

        assert!(snapshot.is_complete());
        assert!(snapshot.processing.as_ref().unwrap().is_fallback());
        assert!(snapshot.activity_logs.as_ref().unwrap().is_fallback());
        assert!(snapshot.system_info.as_ref().unwrap().is_fallback());
        assert!(snapshot.resources.as_ref().unwrap().is_fallback());
        assert!(snapshot.error().unwrap().contains("connection refused"));
        assert_eq!(snapshot.processing.unwrap().value.workers.len(), 8);
        assert_eq!(handle.stats().fetches_fallback, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_kind_does_not_affect_the_others() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .set_metric_default(DataKind::ActivityLogs, FakeOutcome::Unimplemented)
            .await;

        let handle = poller(&backend).start(|_| {});
        let snapshot = loaded(&handle).await;

        assert!(snapshot.activity_logs.as_ref().unwrap().is_fallback());
        assert!(!snapshot.processing.as_ref().unwrap().is_fallback());
        assert!(!snapshot.system_info.as_ref().unwrap().is_fallback());
        // A missing endpoint is not reported as an error.
        assert_eq!(snapshot.error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent() {
        let backend = Arc::new(FakeBackend::new());
        let handle = poller(&backend).start(|_| {});
        let before = loaded(&handle).await;
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(!handle.refetch(DataKind::SystemInfo).await);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handle.state(), PollerState::Stopped);
        assert_eq!(backend.metric_calls(DataKind::ActivityLogs).await, 1);
        assert_eq!(backend.metric_calls(DataKind::ProcessingMetrics).await, 1);
        assert_eq!(handle.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn responses_arriving_after_stop_are_dropped() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script_metric(
                DataKind::ProcessingMetrics,
                vec![FakeFetch::with_delay(FakeOutcome::Remote, Duration::from_secs(10))],
            )
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = poller(&backend).start(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
        let seen = calls.load(Ordering::SeqCst);
        let before = handle.snapshot();
        assert!(before.processing.is_none());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), seen);
        assert_eq!(handle.snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn older_response_never_overwrites_a_newer_one() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .script_metric(
                DataKind::ProcessingMetrics,
                vec![
                    FakeFetch::with_delay(FakeOutcome::Remote, Duration::from_secs(10)),
                    FakeFetch::immediate(FakeOutcome::Fail("boom".into())),
                ],
            )
            .await;

        let poller = poller(&backend);
        let (first, second) = tokio::join!(
            poller.refetch(DataKind::ProcessingMetrics),
            poller.refetch(DataKind::ProcessingMetrics)
        );

        assert!(first ^ second);
        assert_eq!(poller.stats().stale_discarded, 1);
        // The later request failed, so its fallback stays in place.
        assert!(poller.snapshot().processing.unwrap().is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_skips_ticks_instead_of_piling_up() {
        let backend = Arc::new(FakeBackend::new());
        backend
            .set_metric_default(
                DataKind::ProcessingMetrics,
                FakeFetch::with_delay(FakeOutcome::Remote, Duration::from_secs(12)),
            )
            .await;

        let handle = poller(&backend).start(|_| {});
        tokio::time::sleep(Duration::from_secs(31)).await;

        // Fetches start at 0s, 15s and 30s; ticks at 5, 10, 20 and 25s are skipped.
        assert_eq!(backend.metric_calls(DataKind::ProcessingMetrics).await, 3);
        assert_eq!(handle.stats().ticks_skipped, 4);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_kinds_refresh_on_the_coarser_interval() {
        let backend = Arc::new(FakeBackend::new());
        let handle = poller(&backend).start(|_| {});
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(backend.metric_calls(DataKind::ActivityLogs).await, 7);
        assert_eq!(backend.metric_calls(DataKind::SystemInfo).await, 2);
        assert_eq!(backend.metric_calls(DataKind::Resources).await, 2);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_polling() {
        let backend = Arc::new(FakeBackend::new());
        let handle = poller(&backend).start(|_| {});
        let state = handle.watch_state();
        drop(handle);
        assert_eq!(*state.borrow(), PollerState::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.metric_calls(DataKind::ActivityLogs).await, 1);
    }
}
