use crate::api::models::*;
use crate::api::{ExamApi, MetricsSource};
use crate::config::schema::{ApiConfig, PollerConfig};
use crate::error::{Error, Result, GENERIC_FAILURE};
use crate::metrics::snapshot::{
    validate_activity_logs, ActivityLogEntry, ProcessingMetrics, RemoteProcessingMetrics,
    ResourceMetrics,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;
use validator::Validate;

const API_PREFIX: [&str; 2] = ["api", "v1"];

/// Optional backend paths for dashboard data the stock backend does not serve.
#[derive(Debug, Clone, Default)]
pub struct MetricPaths {
    pub processing_metrics: Option<String>,
    pub activity_logs: Option<String>,
    pub resources: Option<String>,
}

impl From<&PollerConfig> for MetricPaths {
    fn from(config: &PollerConfig) -> Self {
        Self {
            processing_metrics: config.processing_metrics_path.clone(),
            activity_logs: config.activity_logs_path.clone(),
            resources: config.resources_path.clone(),
        }
    }
}

/// HTTP client for the exam backend. Constructed explicitly and handed to
/// whoever needs it; it holds no global state.
#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    client: Client,
    token: Option<String>,
    metric_paths: MetricPaths,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!("{} cannot be used as a base URL", base_url)));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            base_url,
            client,
            token: token.filter(|t| !t.trim().is_empty()),
            metric_paths: MetricPaths::default(),
        })
    }

    pub fn with_metric_paths(mut self, paths: MetricPaths) -> Self {
        self.metric_paths = paths;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn api(&self, segments: &[&str]) -> Result<Url> {
        let all: Vec<&str> = API_PREFIX.iter().chain(segments).copied().collect();
        self.endpoint(&all)
    }

    fn configured(&self, path: &Option<String>, what: &'static str) -> Result<Url> {
        let path = path.as_deref().ok_or(Error::Unimplemented(what))?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        log::debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<String> {
        let res = builder.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            let message = server_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_owned))
                .unwrap_or_else(|| GENERIC_FAILURE.to_string());
            log::debug!("API error {}: {}", status.as_u16(), message);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn get<T>(&self, what: &'static str, url: Url) -> Result<T>
    where
        T: DeserializeOwned + Validate,
    {
        let body = self.execute(self.request(Method::GET, url)).await?;
        decode_checked(what, &body)
    }

    async fn get_list<T>(&self, what: &'static str, url: Url) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Validate,
    {
        let body = self.execute(self.request(Method::GET, url)).await?;
        decode_list(what, &body)
    }

    async fn send_json<B, T>(&self, what: &'static str, method: Method, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned + Validate,
    {
        let body = self.execute(self.request(method, url).json(body)).await?;
        decode_checked(what, &body)
    }

    async fn acknowledge(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let builder = self.request(method, url);
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        let body = self.execute(builder).await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| Error::malformed("acknowledgement", e.to_string()))
    }
}

fn decode<T: DeserializeOwned>(what: &'static str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::malformed(what, e.to_string()))
}

fn decode_checked<T>(what: &'static str, body: &str) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let value: T = decode(what, body)?;
    value
        .validate()
        .map_err(|e| Error::malformed(what, e.to_string()))?;
    Ok(value)
}

fn decode_list<T>(what: &'static str, body: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned + Validate,
{
    let values: Vec<T> = decode(what, body)?;
    for (i, value) in values.iter().enumerate() {
        value
            .validate()
            .map_err(|e| Error::malformed(what, format!("item {}: {}", i, e)))?;
    }
    Ok(values)
}

/// Pulls a human readable message out of an error body.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            let from_detail = match map.get("detail") {
                Some(Value::String(s)) => Some(s.clone()),
                // FastAPI validation errors: [{"loc": [...], "msg": "...", ...}]
                Some(Value::Array(items)) => {
                    let msgs: Vec<&str> = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(Value::as_str))
                        .collect();
                    (!msgs.is_empty()).then(|| msgs.join("; "))
                }
                _ => None,
            };
            from_detail.or_else(|| {
                ["message", "error"]
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str).map(str::to_owned))
            })
        }
        Ok(Value::String(s)) => Some(s),
        Ok(_) => None,
        Err(_) if trimmed.len() <= 200 => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

#[async_trait]
impl ExamApi for ApiClient {
    async fn list_exams(&self, skip: u32, limit: u32) -> Result<Vec<Exam>> {
        let mut url = self.api(&["exams"])?;
        url.query_pairs_mut()
            .append_pair("skip", &skip.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_list("exam list", url).await
    }

    async fn get_exam(&self, id: &str) -> Result<Exam> {
        self.get("exam", self.api(&["exams", id])?).await
    }

    async fn create_exam(&self, request: CreateExamRequest) -> Result<Exam> {
        let request = request.prepare()?;
        log::info!("Creating exam '{}' with {} question(s)", request.title, request.questions.len());
        self.send_json("exam", Method::POST, self.api(&["exams"])?, &request)
            .await
    }

    async fn activate_exam(&self, id: &str) -> Result<Value> {
        self.acknowledge(Method::PUT, self.api(&["exams", id, "activate"])?, None)
            .await
    }

    async fn enrolled_applicants(&self, exam_id: &str) -> Result<Vec<Applicant>> {
        self.get_list("enrollment list", self.api(&["exams", exam_id, "enrollments"])?)
            .await
    }

    async fn enroll_applicants(&self, exam_id: &str, request: BulkEnrollRequest) -> Result<Value> {
        request.validate()?;
        let body = serde_json::to_value(&request)?;
        self.acknowledge(
            Method::POST,
            self.api(&["exams", exam_id, "enrollments"])?,
            Some(&body),
        )
        .await
    }

    async fn start_all_sessions(&self, exam_id: &str) -> Result<Value> {
        self.acknowledge(Method::POST, self.api(&["exams", exam_id, "start-all"])?, None)
            .await
    }

    async fn list_applicants(&self) -> Result<Vec<Applicant>> {
        self.get_list("applicant list", self.api(&["applicants"])?).await
    }

    async fn get_applicant(&self, id: &str) -> Result<Applicant> {
        self.get("applicant", self.api(&["applicants", id])?).await
    }

    async fn get_applicant_by_email(&self, email: &str) -> Result<Applicant> {
        self.get("applicant", self.api(&["applicants", "email", email])?)
            .await
    }

    async fn create_applicant(&self, request: CreateApplicantRequest) -> Result<Applicant> {
        let request = request.prepare()?;
        self.send_json("applicant", Method::POST, self.api(&["applicants"])?, &request)
            .await
    }

    async fn submit_response(
        &self,
        session_id: &str,
        request: SubmitResponseRequest,
    ) -> Result<ApplicantResponse> {
        request.validate()?;
        self.send_json(
            "response",
            Method::POST,
            self.api(&["sessions", session_id, "responses"])?,
            &request,
        )
        .await
    }

    async fn end_session(&self, session_id: &str) -> Result<Value> {
        self.acknowledge(Method::PUT, self.api(&["sessions", session_id, "end"])?, None)
            .await
    }

    async fn session_responses(&self, session_id: &str) -> Result<Vec<ApplicantResponse>> {
        self.get_list("response list", self.api(&["sessions", session_id, "responses"])?)
            .await
    }

    async fn evaluate_exam(&self, request: EvaluateExamRequest) -> Result<EvaluationJob> {
        request.validate()?;
        log::info!(
            "Requesting evaluation of exam {} with {} parallel process(es)",
            request.exam_id,
            request.parallel_processes
        );
        self.send_json(
            "evaluation job",
            Method::POST,
            self.api(&["evaluations", "evaluate-exam"])?,
            &request,
        )
        .await
    }

    async fn exam_stats(&self, exam_id: &str) -> Result<ExamStats> {
        self.get("exam stats", self.api(&["reports", "exam-stats", exam_id])?)
            .await
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        self.get("system info", self.api(&["system", "info"])?).await
    }

    async fn health(&self) -> Result<HealthStatus> {
        let body = self
            .execute(self.request(Method::GET, self.endpoint(&["health"])?))
            .await?;
        decode("health", &body)
    }
}

#[async_trait]
impl MetricsSource for ApiClient {
    async fn fetch_processing_metrics(&self) -> Result<ProcessingMetrics> {
        let url = self.configured(&self.metric_paths.processing_metrics, "processing metrics")?;
        let body = self.execute(self.request(Method::GET, url)).await?;
        decode::<RemoteProcessingMetrics>("processing metrics", &body)?.into_metrics()
    }

    async fn fetch_activity_logs(&self) -> Result<Vec<ActivityLogEntry>> {
        let url = self.configured(&self.metric_paths.activity_logs, "activity logs")?;
        let body = self.execute(self.request(Method::GET, url)).await?;
        let entries: Vec<ActivityLogEntry> = decode("activity logs", &body)?;
        validate_activity_logs(&entries)?;
        Ok(entries)
    }

    async fn fetch_system_info(&self) -> Result<SystemInfo> {
        ExamApi::system_info(self).await
    }

    async fn fetch_resources(&self) -> Result<ResourceMetrics> {
        let url = self.configured(&self.metric_paths.resources, "resource metrics")?;
        let body = self.execute(self.request(Method::GET, url)).await?;
        let resources: ResourceMetrics = decode("resource metrics", &body)?;
        resources.check()?;
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        let config = ApiConfig {
            base_url: base.to_string(),
            ..ApiConfig::default()
        };
        ApiClient::new(&config, None).unwrap()
    }

    #[test]
    fn endpoints_keep_base_path_and_encode_segments() {
        let c = client("http://localhost:8000/backend/");
        let url = c.api(&["applicants", "email", "ana maria@example.com"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/backend/api/v1/applicants/email/ana%20maria@example.com"
        );
        assert_eq!(c.endpoint(&["health"]).unwrap().path(), "/backend/health");
    }

    #[test]
    fn missing_metric_path_is_unimplemented() {
        let c = client("http://localhost:8000");
        let err = c.configured(&None, "activity logs").unwrap_err();
        assert!(matches!(err, Error::Unimplemented("activity logs")));

        let url = c
            .configured(&Some("/api/v1/metrics/processing".into()), "processing metrics")
            .unwrap();
        assert_eq!(url.path(), "/api/v1/metrics/processing");
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = ApiConfig::default();
        assert!(!ApiClient::new(&config, Some("  ".into())).unwrap().has_token());
        assert!(ApiClient::new(&config, Some("abc".into())).unwrap().has_token());
    }

    #[test]
    fn server_message_reads_common_shapes() {
        assert_eq!(server_message(r#"{"detail": "Exam not found"}"#).as_deref(), Some("Exam not found"));
        assert_eq!(
            server_message(r#"{"detail": [{"loc": ["body", "title"], "msg": "field required"}]}"#).as_deref(),
            Some("field required")
        );
        assert_eq!(server_message(r#"{"message": "nope"}"#).as_deref(), Some("nope"));
        assert_eq!(server_message("Bad Gateway").as_deref(), Some("Bad Gateway"));
        assert_eq!(server_message(""), None);
        assert_eq!(server_message("[1, 2]"), None);
    }
}
