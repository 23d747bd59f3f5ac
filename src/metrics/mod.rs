pub mod collector;
pub mod fallback;
pub mod snapshot;

pub use collector::{PollStats, PollStatsCollector};
pub use fallback::FallbackGenerator;
pub use snapshot::{
    ActivityLogEntry, DashboardSnapshot, DataOrigin, LogLevel, ProcessingMetrics,
    RemoteProcessingMetrics, ResourceMetrics, ResourceSample, Slice, WorkerState, WorkerStatus,
};
