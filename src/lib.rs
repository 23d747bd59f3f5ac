pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod output;
pub mod poller;
pub mod transfer;

pub use api::{ApiClient, ExamApi, FakeBackend, MetricsSource, TokenStore};
pub use config::{ConfigLoader, ConsoleConfig};
pub use error::{Error, Result};
pub use metrics::fallback::FallbackGenerator;
pub use metrics::snapshot::DashboardSnapshot;
pub use poller::{DataKind, MetricsPoller, PollerHandle, PollerState};
