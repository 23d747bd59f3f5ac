use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollStats {
    pub fetches_total: u64,
    pub fetches_remote: u64,
    pub fetches_fallback: u64,
    pub stale_discarded: u64,
    pub ticks_skipped: u64,
    pub remote_rate: f64,
    pub avg_fetch_time_ms: u64,
    pub elapsed_seconds: f64,
}

/// Counters describing how the poller has been feeding the dashboard.
#[derive(Clone)]
pub struct PollStatsCollector {
    fetches_total: Arc<AtomicU64>,
    fetches_remote: Arc<AtomicU64>,
    fetches_fallback: Arc<AtomicU64>,
    stale_discarded: Arc<AtomicU64>,
    ticks_skipped: Arc<AtomicU64>,
    total_fetch_time_ms: Arc<AtomicU64>,
    start_time: Arc<Instant>,
}

impl Default for PollStatsCollector {
    fn default() -> Self {
        Self {
            fetches_total: Arc::new(AtomicU64::new(0)),
            fetches_remote: Arc::new(AtomicU64::new(0)),
            fetches_fallback: Arc::new(AtomicU64::new(0)),
            stale_discarded: Arc::new(AtomicU64::new(0)),
            ticks_skipped: Arc::new(AtomicU64::new(0)),
            total_fetch_time_ms: Arc::new(AtomicU64::new(0)),
            start_time: Arc::new(Instant::now()),
        }
    }
}

impl PollStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_remote(&self, duration: Duration) {
        self.fetches_total.fetch_add(1, Ordering::SeqCst);
        self.fetches_remote.fetch_add(1, Ordering::SeqCst);
        self.total_fetch_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn record_fallback(&self, duration: Duration) {
        self.fetches_total.fetch_add(1, Ordering::SeqCst);
        self.fetches_fallback.fetch_add(1, Ordering::SeqCst);
        self.total_fetch_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn increment_stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_ticks_skipped(&self) {
        self.ticks_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PollStats {
        let total = self.fetches_total.load(Ordering::SeqCst);
        let remote = self.fetches_remote.load(Ordering::SeqCst);
        let total_time = self.total_fetch_time_ms.load(Ordering::SeqCst);

        PollStats {
            fetches_total: total,
            fetches_remote: remote,
            fetches_fallback: self.fetches_fallback.load(Ordering::SeqCst),
            stale_discarded: self.stale_discarded.load(Ordering::SeqCst),
            ticks_skipped: self.ticks_skipped.load(Ordering::SeqCst),
            remote_rate: if total > 0 {
                (remote as f64 / total as f64) * 100.0
            } else {
                0.0
            },
            avg_fetch_time_ms: if total > 0 { total_time / total } else { 0 },
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_before_any_fetch() {
        let stats = PollStatsCollector::new().snapshot();
        assert_eq!(stats.fetches_total, 0);
        assert_eq!(stats.remote_rate, 0.0);
        assert_eq!(stats.avg_fetch_time_ms, 0);
    }

    #[test]
    fn remote_rate_counts_fallbacks() {
        let collector = PollStatsCollector::new();
        collector.record_remote(Duration::from_millis(30));
        collector.record_fallback(Duration::from_millis(10));
        collector.record_fallback(Duration::from_millis(20));
        collector.record_fallback(Duration::from_millis(40));
        collector.increment_stale_discarded();

        let stats = collector.snapshot();
        assert_eq!(stats.fetches_total, 4);
        assert_eq!(stats.fetches_fallback, 3);
        assert_eq!(stats.stale_discarded, 1);
        assert!((stats.remote_rate - 25.0).abs() < 1e-9);
        assert_eq!(stats.avg_fetch_time_ms, 25);
    }
}
