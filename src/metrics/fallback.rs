//! Synthetic dashboard values used whenever the backend cannot supply them.

use crate::api::models::{QuestionType, SystemInfo, SystemLimits};
use crate::metrics::snapshot::{
    ActivityLogEntry, LogLevel, ProcessingMetrics, ResourceMetrics, ResourceSample, WorkerState,
    WorkerStatus,
};
use chrono::{Duration as ChronoDuration, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

const HISTORY_LEN: i64 = 20;
const HISTORY_STEP_SECS: i64 = 30;

pub struct FallbackGenerator {
    application_name: String,
    worker_count: u32,
    total_count: u64,
    rng: Mutex<StdRng>,
}

impl FallbackGenerator {
    pub fn new(application_name: impl Into<String>, worker_count: u32, total_count: u64) -> Self {
        Self::with_rng(application_name, worker_count, total_count, StdRng::from_os_rng())
    }

    /// Deterministic generator for tests.
    pub fn seeded(seed: u64, worker_count: u32, total_count: u64) -> Self {
        Self::with_rng("Parallel Exam System", worker_count, total_count, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        application_name: impl Into<String>,
        worker_count: u32,
        total_count: u64,
        rng: StdRng,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            worker_count,
            total_count,
            rng: Mutex::new(rng),
        }
    }

    fn with_rng_mut<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // A poisoned lock still holds a usable generator.
        let mut guard = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn processing_metrics(&self) -> ProcessingMetrics {
        self.with_rng_mut(|rng| {
            let workers = (1..=self.worker_count)
                .map(|id| WorkerState {
                    id,
                    label: format!("Worker {}", id),
                    utilization_percent: f64::from(rng.random_range(0..=100u32)),
                    state: if rng.random_bool(0.9) {
                        WorkerStatus::Active
                    } else {
                        WorkerStatus::Idle
                    },
                })
                .collect();

            ProcessingMetrics::new(
                rng.random_range(0..1000),
                self.total_count,
                f64::from(rng.random_range(0..100u32)),
                "--",
                workers,
            )
        })
    }

    pub fn activity_logs(&self) -> Vec<ActivityLogEntry> {
        let now = Local::now();
        let entries = [
            (5, LogLevel::Success, "Evaluation completed - Mathematics exam - 45 applicants", "Evaluator"),
            (15, LogLevel::Info, "New applicant registered", "System"),
            (30, LogLevel::Success, "Physics exam is now available", "ExamManager"),
            (45, LogLevel::Warning, "Worker 3 running with low utilization", "Monitor"),
            (120, LogLevel::Info, "System started - all services operational", "System"),
        ];

        entries
            .into_iter()
            .enumerate()
            .map(|(i, (minutes_ago, level, message, source))| ActivityLogEntry {
                id: (i + 1).to_string(),
                timestamp: (now - ChronoDuration::minutes(minutes_ago))
                    .format("%H:%M:%S")
                    .to_string(),
                level,
                message: message.to_string(),
                source: source.to_string(),
            })
            .collect()
    }

    pub fn system_info(&self) -> SystemInfo {
        SystemInfo {
            application_name: self.application_name.clone(),
            debug_mode: false,
            evaluator_path: "unavailable".to_string(),
            database_connected: false,
            limits: SystemLimits {
                max_parallel_processes: 16,
                max_exam_duration_minutes: 180,
                supported_question_types: QuestionType::ALL
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            },
        }
    }

    pub fn resources(&self) -> ResourceMetrics {
        let now = Local::now();
        self.with_rng_mut(|rng| {
            let history = (0..HISTORY_LEN)
                .map(|i| {
                    let at = now - ChronoDuration::seconds((HISTORY_LEN - 1 - i) * HISTORY_STEP_SECS);
                    sample(rng, at.format("%H:%M").to_string())
                })
                .collect();

            ResourceMetrics {
                current: sample(rng, now.format("%H:%M").to_string()),
                history,
            }
        })
    }
}

fn sample(rng: &mut StdRng, time: String) -> ResourceSample {
    ResourceSample {
        time,
        cpu_percent: f64::from(rng.random_range(30..70u32)),
        memory_percent: f64::from(rng.random_range(50..80u32)),
        disk_percent: f64::from(rng.random_range(60..80u32)),
        network_mbps: f64::from(rng.random_range(10..110u32)),
    }
}
