use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsoleConfig {
    #[serde(default = "default_application_name")]
    #[validate(length(min = 1))]
    pub application_name: String,

    #[serde(default)]
    #[validate]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    #[validate]
    pub poller: PollerConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            poller: PollerConfig::default(),
            extends: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Where the bearer token is persisted between runs
    #[serde(default)]
    pub token_path: Option<PathBuf>,

    /// Token supplied directly (usually through the environment)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub required: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_path: None,
            token: None,
            required: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PollerConfig {
    #[serde(default = "default_metrics_interval")]
    #[validate(range(min = 100))]
    pub metrics_interval_ms: u64,

    #[serde(default = "default_resources_interval")]
    #[validate(range(min = 100))]
    pub resources_interval_ms: u64,

    #[serde(default = "default_worker_count")]
    #[validate(range(min = 1, max = 256))]
    pub worker_count: u32,

    #[serde(default = "default_total_applicants")]
    pub total_applicants: u64,

    #[serde(default)]
    pub processing_metrics_path: Option<String>,

    #[serde(default)]
    pub activity_logs_path: Option<String>,

    #[serde(default)]
    pub resources_path: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: default_metrics_interval(),
            resources_interval_ms: default_resources_interval(),
            worker_count: default_worker_count(),
            total_applicants: default_total_applicants(),
            processing_metrics_path: None,
            activity_logs_path: None,
            resources_path: None,
        }
    }
}

impl PollerConfig {
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn resources_interval(&self) -> Duration {
        Duration::from_millis(self.resources_interval_ms)
    }
}

fn default_application_name() -> String {
    "Parallel Exam System".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("exam-console/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_metrics_interval() -> u64 {
    5_000
}

fn default_resources_interval() -> u64 {
    30_000
}

fn default_worker_count() -> u32 {
    8
}

fn default_total_applicants() -> u64 {
    50_000
}
