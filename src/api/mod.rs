use crate::error::Result;
use crate::metrics::snapshot::{ActivityLogEntry, ProcessingMetrics, ResourceMetrics};
use async_trait::async_trait;
use serde_json::Value;

pub mod client;
pub mod fake;
pub mod models;
pub mod token;

pub use client::ApiClient;
pub use fake::FakeBackend;
pub use models::*;
pub use token::TokenStore;

/// Operations the console performs against the exam backend.
#[async_trait]
pub trait ExamApi: Send + Sync {
    async fn list_exams(&self, skip: u32, limit: u32) -> Result<Vec<Exam>>;
    async fn get_exam(&self, id: &str) -> Result<Exam>;
    async fn create_exam(&self, request: CreateExamRequest) -> Result<Exam>;
    async fn activate_exam(&self, id: &str) -> Result<Value>;
    async fn enrolled_applicants(&self, exam_id: &str) -> Result<Vec<Applicant>>;
    async fn enroll_applicants(&self, exam_id: &str, request: BulkEnrollRequest) -> Result<Value>;
    async fn start_all_sessions(&self, exam_id: &str) -> Result<Value>;

    async fn list_applicants(&self) -> Result<Vec<Applicant>>;
    async fn get_applicant(&self, id: &str) -> Result<Applicant>;
    async fn get_applicant_by_email(&self, email: &str) -> Result<Applicant>;
    async fn create_applicant(&self, request: CreateApplicantRequest) -> Result<Applicant>;

    async fn submit_response(
        &self,
        session_id: &str,
        request: SubmitResponseRequest,
    ) -> Result<ApplicantResponse>;
    async fn end_session(&self, session_id: &str) -> Result<Value>;
    async fn session_responses(&self, session_id: &str) -> Result<Vec<ApplicantResponse>>;

    async fn evaluate_exam(&self, request: EvaluateExamRequest) -> Result<EvaluationJob>;
    async fn exam_stats(&self, exam_id: &str) -> Result<ExamStats>;

    async fn system_info(&self) -> Result<SystemInfo>;
    async fn health(&self) -> Result<HealthStatus>;
}

/// Where the metrics poller reads each kind of dashboard data from.
///
/// Implementations return [`crate::Error::Unimplemented`] for kinds they
/// cannot provide; the poller substitutes synthetic values in that case.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch_processing_metrics(&self) -> Result<ProcessingMetrics>;
    async fn fetch_activity_logs(&self) -> Result<Vec<ActivityLogEntry>>;
    async fn fetch_system_info(&self) -> Result<SystemInfo>;
    async fn fetch_resources(&self) -> Result<ResourceMetrics>;
}
