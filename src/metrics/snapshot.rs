use crate::api::models::SystemInfo;
use crate::error::{Error, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Idle,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: u32,
    pub label: String,
    pub utilization_percent: f64,
    pub state: WorkerStatus,
}

/// Progress of the parallel evaluation job as shown on the dashboard.
///
/// `active_worker_count` and `average_utilization` are always derived from
/// `workers`; use [`ProcessingMetrics::new`] to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub processed_count: u64,
    pub total_count: u64,
    pub throughput_per_minute: f64,
    pub estimated_time_remaining: String,
    pub workers: Vec<WorkerState>,
    pub active_worker_count: usize,
    pub average_utilization: f64,
}

impl ProcessingMetrics {
    pub fn new(
        processed_count: u64,
        total_count: u64,
        throughput_per_minute: f64,
        estimated_time_remaining: impl Into<String>,
        workers: Vec<WorkerState>,
    ) -> Self {
        let active_worker_count = workers
            .iter()
            .filter(|w| w.state == WorkerStatus::Active)
            .count();
        let average_utilization = if workers.is_empty() {
            0.0
        } else {
            workers.iter().map(|w| w.utilization_percent).sum::<f64>() / workers.len() as f64
        };

        Self {
            processed_count,
            total_count,
            throughput_per_minute,
            estimated_time_remaining: estimated_time_remaining.into(),
            workers,
            active_worker_count,
            average_utilization,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_count == 0 {
            0.0
        } else {
            (self.processed_count as f64 / self.total_count as f64 * 100.0).min(100.0)
        }
    }
}

/// Processing metrics as a remote source reports them. Derived fields are
/// ignored on the wire and recomputed.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProcessingMetrics {
    pub processed_count: u64,
    pub total_count: u64,
    #[serde(default)]
    pub throughput_per_minute: f64,
    #[serde(default = "unknown_remaining")]
    pub estimated_time_remaining: String,
    #[serde(default)]
    pub workers: Vec<WorkerState>,
}

fn unknown_remaining() -> String {
    "--".to_string()
}

impl RemoteProcessingMetrics {
    pub fn into_metrics(self) -> Result<ProcessingMetrics> {
        const WHAT: &str = "processing metrics";

        if !self.throughput_per_minute.is_finite() || self.throughput_per_minute < 0.0 {
            return Err(Error::malformed(WHAT, "throughput must be a non-negative number"));
        }
        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.id == 0 {
                return Err(Error::malformed(WHAT, "worker ids start at 1"));
            }
            if !seen.insert(worker.id) {
                return Err(Error::malformed(WHAT, format!("duplicate worker id {}", worker.id)));
            }
            if !is_percent(worker.utilization_percent) {
                return Err(Error::malformed(
                    WHAT,
                    format!(
                        "worker {} utilization {} outside 0-100",
                        worker.id, worker.utilization_percent
                    ),
                ));
            }
        }

        Ok(ProcessingMetrics::new(
            self.processed_count,
            self.total_count,
            self.throughput_per_minute,
            self.estimated_time_remaining,
            self.workers,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: String,
    /// Local time of day, `HH:MM:SS`.
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
}

pub fn validate_activity_logs(entries: &[ActivityLogEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.id.as_str()) {
            return Err(Error::malformed(
                "activity logs",
                format!("duplicate entry id {}", entry.id),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Local time, `HH:MM`.
    pub time: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub network_mbps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub current: ResourceSample,
    pub history: Vec<ResourceSample>,
}

impl ResourceMetrics {
    pub fn check(&self) -> Result<()> {
        for sample in std::iter::once(&self.current).chain(&self.history) {
            let percents = [sample.cpu_percent, sample.memory_percent, sample.disk_percent];
            if !percents.iter().copied().all(is_percent) {
                return Err(Error::malformed(
                    "resource metrics",
                    format!("percentage outside 0-100 at {}", sample.time),
                ));
            }
            if !sample.network_mbps.is_finite() || sample.network_mbps < 0.0 {
                return Err(Error::malformed(
                    "resource metrics",
                    format!("negative network throughput at {}", sample.time),
                ));
            }
        }
        Ok(())
    }
}

fn is_percent(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "lowercase")]
pub enum DataOrigin {
    Remote,
    Fallback { reason: String, unimplemented: bool },
}

/// One independently refreshed part of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice<T> {
    pub value: T,
    pub origin: DataOrigin,
    pub updated_at: DateTime<Local>,
}

impl<T> Slice<T> {
    pub fn remote(value: T) -> Self {
        Self {
            value,
            origin: DataOrigin::Remote,
            updated_at: Local::now(),
        }
    }

    pub fn fallback(value: T, cause: &Error) -> Self {
        Self {
            value,
            origin: DataOrigin::Fallback {
                reason: cause.to_string(),
                unimplemented: cause.is_unimplemented(),
            },
            updated_at: Local::now(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.origin, DataOrigin::Fallback { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub processing: Option<Slice<ProcessingMetrics>>,
    pub activity_logs: Option<Slice<Vec<ActivityLogEntry>>>,
    pub system_info: Option<Slice<SystemInfo>>,
    pub resources: Option<Slice<ResourceMetrics>>,
    pub is_loading: bool,
}

impl Default for DashboardSnapshot {
    fn default() -> Self {
        Self {
            processing: None,
            activity_logs: None,
            system_info: None,
            resources: None,
            is_loading: true,
        }
    }
}

impl DashboardSnapshot {
    pub fn is_complete(&self) -> bool {
        self.processing.is_some()
            && self.activity_logs.is_some()
            && self.system_info.is_some()
            && self.resources.is_some()
    }

    /// First fallback reason caused by a real failure rather than a missing endpoint.
    pub fn error(&self) -> Option<&str> {
        [
            self.processing.as_ref().map(|s| &s.origin),
            self.activity_logs.as_ref().map(|s| &s.origin),
            self.system_info.as_ref().map(|s| &s.origin),
            self.resources.as_ref().map(|s| &s.origin),
        ]
        .into_iter()
        .flatten()
        .find_map(|origin| match origin {
            DataOrigin::Fallback {
                reason,
                unimplemented: false,
            } => Some(reason.as_str()),
            _ => None,
        })
    }
}
