//! In-memory stand-in for the exam backend.
//!
//! Used by tests and by `--offline`. Metric fetches can be scripted per
//! [`DataKind`] with outcomes and delays, the same way a fake transport
//! scripts its responses.

use crate::api::models::*;
use crate::api::{ExamApi, MetricsSource};
use crate::error::{Error, Result};
use crate::metrics::snapshot::{
    ActivityLogEntry, LogLevel, ProcessingMetrics, ResourceMetrics, ResourceSample, WorkerState,
    WorkerStatus,
};
use crate::poller::DataKind;
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use validator::Validate;

const MAX_LOG_ENTRIES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeOutcome {
    Remote,
    Fail(String),
    Unimplemented,
}

#[derive(Debug, Clone)]
pub struct FakeFetch {
    outcome: FakeOutcome,
    delay: Option<Duration>,
}

impl FakeFetch {
    pub fn immediate(outcome: FakeOutcome) -> Self {
        Self {
            outcome,
            delay: None,
        }
    }

    pub fn with_delay(outcome: FakeOutcome, delay: Duration) -> Self {
        Self {
            outcome,
            delay: Some(delay),
        }
    }
}

impl From<FakeOutcome> for FakeFetch {
    fn from(outcome: FakeOutcome) -> Self {
        Self::immediate(outcome)
    }
}

struct MetricScript {
    queue: VecDeque<FakeFetch>,
    default: FakeFetch,
    calls: usize,
}

impl Default for MetricScript {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            default: FakeFetch::immediate(FakeOutcome::Remote),
            calls: 0,
        }
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    exams: Vec<Exam>,
    applicants: Vec<Applicant>,
    enrollments: HashMap<String, Vec<String>>,
    sessions: BTreeMap<String, ExamSession>,
    responses: HashMap<String, Vec<ApplicantResponse>>,
    jobs: u64,
    activity: VecDeque<ActivityLogEntry>,
    scripts: HashMap<DataKind, MetricScript>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn record(&mut self, level: LogLevel, source: &str, message: String) {
        let id = self.next_id("log");
        self.activity.push_front(ActivityLogEntry {
            id,
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            level,
            message,
            source: source.to_string(),
        });
        self.activity.truncate(MAX_LOG_ENTRIES);
    }

    fn exam(&self, id: &str) -> Result<&Exam> {
        self.exams
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| not_found("Exam", id))
    }

    fn exam_mut(&mut self, id: &str) -> Result<&mut Exam> {
        self.exams
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| not_found("Exam", id))
    }

    fn applicant(&self, id: &str) -> Result<&Applicant> {
        self.applicants
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found("Applicant", id))
    }

    fn session_mut(&mut self, id: &str) -> Result<&mut ExamSession> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| not_found("Session", id))
    }

    /// Grades every response of the exam's sessions and returns
    /// `(applicant_id, score_percentage)` per session.
    fn grade(&mut self, exam_id: &str) -> Result<Vec<(String, f64)>> {
        let exam = self.exam(exam_id)?.clone();
        let answers: HashMap<&str, (&str, i64)> = exam
            .questions
            .iter()
            .map(|q| (q.id.as_str(), (q.correct_answer.as_str(), q.points)))
            .collect();

        let mut scores = Vec::new();
        for session in self.sessions.values().filter(|s| s.exam_id == exam_id) {
            let mut earned = 0.0;
            for response in self.responses.entry(session.id.clone()).or_default() {
                let (correct, points) = answers
                    .get(response.question_id.as_str())
                    .copied()
                    .unwrap_or(("", 0));
                let is_correct = response.answer.trim().eq_ignore_ascii_case(correct.trim());
                response.is_correct = Some(is_correct);
                response.points_earned = Some(if is_correct { points as f64 } else { 0.0 });
                earned += response.points_earned.unwrap_or(0.0);
            }
            let percentage = if exam.total_points > 0 {
                earned / exam.total_points as f64 * 100.0
            } else {
                0.0
            };
            scores.push((session.applicant_id.clone(), percentage));
        }
        Ok(scores)
    }
}

fn not_found(what: &str, id: &str) -> Error {
    Error::Api {
        status: 404,
        message: format!("{} {} not found", what, id),
    }
}

fn bad_request(message: impl Into<String>) -> Error {
    Error::Api {
        status: 400,
        message: message.into(),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn score_bucket(percentage: f64) -> &'static str {
    match percentage {
        p if p >= 90.0 => "90-100",
        p if p >= 80.0 => "80-89",
        p if p >= 70.0 => "70-79",
        p if p >= 60.0 => "60-69",
        _ => "0-59",
    }
}

/// Thread-safe in-memory backend.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend with a few applicants and a draft exam to play with.
    pub async fn demo() -> Self {
        let backend = Self::new();
        for (name, email, reg) in [
            ("Maria Gonzalez", "maria.gonzalez@example.com", Some("REG-001")),
            ("Juan Perez", "juan.perez@example.com", Some("REG-002")),
            ("Ana Torres", "ana.torres@example.com", None),
        ] {
            let request = CreateApplicantRequest {
                name: name.to_string(),
                email: email.to_string(),
                registration_number: reg.map(str::to_string),
            };
            if let Err(e) = backend.create_applicant(request).await {
                log::warn!("Demo applicant {} not seeded: {}", email, e);
            }
        }
        let exam = CreateExamRequest {
            title: "Basic Mathematics".to_string(),
            description: Some("Arithmetic warm-up".to_string()),
            duration_minutes: 45,
            questions: vec![
                NewQuestion {
                    content: "What is 7 x 8?".to_string(),
                    question_type: QuestionType::MultipleChoice,
                    options: Some(vec!["54".into(), "56".into(), "58".into(), "64".into()]),
                    correct_answer: "56".to_string(),
                    points: 2,
                },
                NewQuestion {
                    content: "Zero is an even number".to_string(),
                    question_type: QuestionType::TrueFalse,
                    options: None,
                    correct_answer: "true".to_string(),
                    points: 1,
                },
            ],
        };
        if let Err(e) = backend.create_exam(exam).await {
            log::warn!("Demo exam not seeded: {}", e);
        }
        backend
    }

    pub async fn insert_exam(&self, exam: Exam) {
        let mut state = self.state.lock().await;
        match state.exams.iter().position(|e| e.id == exam.id) {
            Some(i) => state.exams[i] = exam,
            None => state.exams.push(exam),
        }
    }

    pub async fn insert_applicant(&self, applicant: Applicant) {
        let mut state = self.state.lock().await;
        state.applicants.retain(|a| a.id != applicant.id);
        state.applicants.push(applicant);
    }

    /// Queues outcomes for the next fetches of `kind`.
    pub async fn script_metric(&self, kind: DataKind, fetches: Vec<FakeFetch>) {
        let mut state = self.state.lock().await;
        state.scripts.entry(kind).or_default().queue.extend(fetches);
    }

    /// Outcome used once the queued script for `kind` runs out.
    pub async fn set_metric_default(&self, kind: DataKind, fetch: impl Into<FakeFetch>) {
        let mut state = self.state.lock().await;
        state.scripts.entry(kind).or_default().default = fetch.into();
    }

    pub async fn fail_all_metrics(&self, message: &str) {
        for kind in DataKind::ALL {
            self.set_metric_default(kind, FakeOutcome::Fail(message.to_string()))
                .await;
        }
    }

    pub async fn metric_calls(&self, kind: DataKind) -> usize {
        let state = self.state.lock().await;
        state.scripts.get(&kind).map_or(0, |s| s.calls)
    }

    async fn next_fetch(&self, kind: DataKind) -> Result<()> {
        let fetch = {
            let mut state = self.state.lock().await;
            let script = state.scripts.entry(kind).or_default();
            script.calls += 1;
            script
                .queue
                .pop_front()
                .unwrap_or_else(|| script.default.clone())
        };

        if let Some(delay) = fetch.delay {
            tokio::time::sleep(delay).await;
        }
        match fetch.outcome {
            FakeOutcome::Remote => Ok(()),
            FakeOutcome::Fail(message) => Err(Error::Api {
                status: 503,
                message,
            }),
            FakeOutcome::Unimplemented => Err(Error::Unimplemented(match kind {
                DataKind::ProcessingMetrics => "processing metrics",
                DataKind::ActivityLogs => "activity logs",
                DataKind::SystemInfo => "system info",
                DataKind::Resources => "resource metrics",
            })),
        }
    }

    fn fake_system_info() -> SystemInfo {
        SystemInfo {
            application_name: "Exam Backend (in-memory)".to_string(),
            debug_mode: true,
            evaluator_path: "in-memory".to_string(),
            database_connected: true,
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
}

#[async_trait]
impl ExamApi for FakeBackend {
    async fn list_exams(&self, skip: u32, limit: u32) -> Result<Vec<Exam>> {
        let state = self.state.lock().await;
        Ok(state
            .exams
            .iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_exam(&self, id: &str) -> Result<Exam> {
        let state = self.state.lock().await;
        state.exam(id).cloned()
    }

    async fn create_exam(&self, request: CreateExamRequest) -> Result<Exam> {
        let request = request.prepare()?;
        let (total_questions, total_points) = request.totals();

        let mut state = self.state.lock().await;
        let created_at = now();
        let questions = request
            .questions
            .into_iter()
            .map(|q| Question {
                id: state.next_id("question"),
                content: q.content,
                question_type: q.question_type,
                options: q.options,
                correct_answer: q.correct_answer,
                points: q.points,
                created_at: created_at.clone(),
                updated_at: None,
            })
            .collect();

        let exam = Exam {
            id: state.next_id("exam"),
            title: request.title,
            description: request.description,
            duration_minutes: request.duration_minutes,
            total_questions,
            total_points,
            status: ExamStatus::Draft,
            questions,
            created_at,
            updated_at: None,
        };
        state.record(LogLevel::Success, "ExamManager", format!("Exam created - {}", exam.title));
        state.exams.push(exam.clone());
        Ok(exam)
    }

    async fn activate_exam(&self, id: &str) -> Result<Value> {
        let mut state = self.state.lock().await;
        let exam = state.exam_mut(id)?;
        if exam.status != ExamStatus::Draft {
            return Err(bad_request(format!("Exam is {} and cannot be activated", exam.status)));
        }
        exam.status = ExamStatus::Active;
        exam.updated_at = Some(now());
        let title = exam.title.clone();
        state.record(LogLevel::Success, "ExamManager", format!("Exam {} is now available", title));
        Ok(json!({"message": "Exam activated", "exam_id": id}))
    }

    async fn enrolled_applicants(&self, exam_id: &str) -> Result<Vec<Applicant>> {
        let state = self.state.lock().await;
        state.exam(exam_id)?;
        let ids = state.enrollments.get(exam_id).cloned().unwrap_or_default();
        ids.iter().map(|id| state.applicant(id).cloned()).collect()
    }

    async fn enroll_applicants(&self, exam_id: &str, request: BulkEnrollRequest) -> Result<Value> {
        request.validate()?;
        let mut state = self.state.lock().await;
        state.exam(exam_id)?;
        for id in &request.applicant_ids {
            state.applicant(id)?;
        }

        let enrolled = state.enrollments.entry(exam_id.to_string()).or_default();
        let mut added = 0;
        for id in request.applicant_ids {
            if !enrolled.contains(&id) {
                enrolled.push(id);
                added += 1;
            }
        }
        state.record(
            LogLevel::Info,
            "ExamManager",
            format!("{} applicant(s) enrolled in exam {}", added, exam_id),
        );
        Ok(json!({"message": "Applicants enrolled", "enrolled": added}))
    }

    async fn start_all_sessions(&self, exam_id: &str) -> Result<Value> {
        let mut state = self.state.lock().await;
        let status = state.exam(exam_id)?.status;
        if !matches!(status, ExamStatus::Active | ExamStatus::InProgress) {
            return Err(bad_request(format!("Exam is {}; activate it first", status)));
        }

        let enrolled = state.enrollments.get(exam_id).cloned().unwrap_or_default();
        let mut started = Vec::new();
        for applicant_id in enrolled {
            let already = state
                .sessions
                .values()
                .any(|s| s.exam_id == exam_id && s.applicant_id == applicant_id);
            if already {
                continue;
            }
            let id = state.next_id("session");
            let timestamp = now();
            state.sessions.insert(
                id.clone(),
                ExamSession {
                    id: id.clone(),
                    exam_id: exam_id.to_string(),
                    applicant_id,
                    start_time: Some(timestamp.clone()),
                    end_time: None,
                    status: "in_progress".to_string(),
                    created_at: timestamp,
                },
            );
            started.push(id);
        }

        state.exam_mut(exam_id)?.status = ExamStatus::InProgress;
        state.record(
            LogLevel::Info,
            "SessionManager",
            format!("{} session(s) started for exam {}", started.len(), exam_id),
        );
        Ok(json!({"message": "Sessions started", "session_ids": started}))
    }

    async fn list_applicants(&self) -> Result<Vec<Applicant>> {
        let state = self.state.lock().await;
        Ok(state.applicants.clone())
    }

    async fn get_applicant(&self, id: &str) -> Result<Applicant> {
        let state = self.state.lock().await;
        state.applicant(id).cloned()
    }

    async fn get_applicant_by_email(&self, email: &str) -> Result<Applicant> {
        let state = self.state.lock().await;
        state
            .applicants
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or_else(|| not_found("Applicant with email", email))
    }

    async fn create_applicant(&self, request: CreateApplicantRequest) -> Result<Applicant> {
        let request = request.prepare()?;
        let mut state = self.state.lock().await;
        if state
            .applicants
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(&request.email))
        {
            return Err(bad_request(format!("Email {} is already registered", request.email)));
        }

        let applicant = Applicant {
            id: state.next_id("applicant"),
            name: request.name,
            email: request.email,
            registration_number: request.registration_number,
            created_at: now(),
        };
        state.record(
            LogLevel::Info,
            "System",
            format!("New applicant registered - {}", applicant.name),
        );
        state.applicants.push(applicant.clone());
        Ok(applicant)
    }

    async fn submit_response(
        &self,
        session_id: &str,
        request: SubmitResponseRequest,
    ) -> Result<ApplicantResponse> {
        request.validate()?;
        let mut state = self.state.lock().await;
        let session = state.session_mut(session_id)?;
        if session.status != "in_progress" {
            return Err(bad_request(format!("Session {} is {}", session_id, session.status)));
        }
        let exam_id = session.exam_id.clone();
        if !state
            .exam(&exam_id)?
            .questions
            .iter()
            .any(|q| q.id == request.question_id)
        {
            return Err(not_found("Question", &request.question_id));
        }

        let response = ApplicantResponse {
            id: state.next_id("response"),
            session_id: session_id.to_string(),
            question_id: request.question_id,
            answer: request.answer,
            is_correct: None,
            points_earned: None,
            submitted_at: now(),
        };
        let responses = state.responses.entry(session_id.to_string()).or_default();
        responses.retain(|r| r.question_id != response.question_id);
        responses.push(response.clone());
        Ok(response)
    }

    async fn end_session(&self, session_id: &str) -> Result<Value> {
        let mut state = self.state.lock().await;
        let session = state.session_mut(session_id)?;
        session.status = "completed".to_string();
        session.end_time = Some(now());
        Ok(json!({"message": "Session ended", "session_id": session_id}))
    }

    async fn session_responses(&self, session_id: &str) -> Result<Vec<ApplicantResponse>> {
        let mut state = self.state.lock().await;
        state.session_mut(session_id)?;
        Ok(state.responses.get(session_id).cloned().unwrap_or_default())
    }

    async fn evaluate_exam(&self, request: EvaluateExamRequest) -> Result<EvaluationJob> {
        request.validate()?;
        let mut state = self.state.lock().await;
        let start_time = now();
        let scores = state.grade(&request.exam_id)?;
        state.jobs += 1;

        let job = EvaluationJob {
            job_id: format!("job-{}", state.jobs),
            status: "completed".to_string(),
            start_time,
            end_time: Some(now()),
            execution_time_seconds: Some(0.0),
            output_data: Some(json!({
                "parallel_processes": request.parallel_processes,
                "evaluated_sessions": scores.len(),
                "scores": scores
                    .iter()
                    .map(|(applicant, score)| json!({"applicant_id": applicant, "score_percentage": score}))
                    .collect::<Vec<_>>(),
            })),
            error_message: None,
        };
        state.record(
            LogLevel::Success,
            "Evaluator",
            format!(
                "Evaluation completed - exam {} - {} session(s)",
                request.exam_id,
                scores.len()
            ),
        );
        Ok(job)
    }

    async fn exam_stats(&self, exam_id: &str) -> Result<ExamStats> {
        let mut state = self.state.lock().await;
        let total_participants = state.enrollments.get(exam_id).map_or(0, Vec::len) as u64;
        let completed_sessions = state
            .sessions
            .values()
            .filter(|s| s.exam_id == exam_id && s.status == "completed")
            .count() as u64;
        let scores = state.grade(exam_id)?;

        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64
        };
        let mut score_distribution = BTreeMap::new();
        for (_, score) in &scores {
            *score_distribution
                .entry(score_bucket(*score).to_string())
                .or_insert(0) += 1;
        }

        Ok(ExamStats {
            exam_id: exam_id.to_string(),
            total_participants,
            completed_sessions,
            average_score,
            score_distribution,
        })
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        Ok(Self::fake_system_info())
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(HealthStatus {
            status: Some("healthy".to_string()),
            details: BTreeMap::from([("backend".to_string(), json!("in-memory"))]),
        })
    }
}

#[async_trait]
impl MetricsSource for FakeBackend {
    async fn fetch_processing_metrics(&self) -> Result<ProcessingMetrics> {
        self.next_fetch(DataKind::ProcessingMetrics).await?;
        let state = self.state.lock().await;
        let responses: Vec<&ApplicantResponse> = state.responses.values().flatten().collect();
        let graded = responses.iter().filter(|r| r.is_correct.is_some()).count() as u64;

        let workers = [
            (80.0, WorkerStatus::Active),
            (65.0, WorkerStatus::Active),
            (0.0, WorkerStatus::Idle),
            (40.0, WorkerStatus::Active),
        ]
        .into_iter()
        .zip(1u32..)
        .map(|((utilization_percent, status), id)| WorkerState {
            id,
            label: format!("Worker {}", id),
            utilization_percent,
            state: status,
        })
        .collect();

        Ok(ProcessingMetrics::new(
            graded,
            responses.len() as u64,
            0.0,
            "--",
            workers,
        ))
    }

    async fn fetch_activity_logs(&self) -> Result<Vec<ActivityLogEntry>> {
        self.next_fetch(DataKind::ActivityLogs).await?;
        let state = self.state.lock().await;
        Ok(state.activity.iter().cloned().collect())
    }

    async fn fetch_system_info(&self) -> Result<SystemInfo> {
        self.next_fetch(DataKind::SystemInfo).await?;
        Ok(Self::fake_system_info())
    }

    async fn fetch_resources(&self) -> Result<ResourceMetrics> {
        self.next_fetch(DataKind::Resources).await?;
        let sample = ResourceSample {
            time: Local::now().format("%H:%M").to_string(),
            cpu_percent: 12.0,
            memory_percent: 35.0,
            disk_percent: 40.0,
            network_mbps: 1.0,
        };
        Ok(ResourceMetrics {
            current: sample.clone(),
            history: vec![sample],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_metric_fetches_run_in_order_then_default() {
        let backend = FakeBackend::new();
        backend
            .script_metric(
                DataKind::SystemInfo,
                vec![FakeOutcome::Fail("down".into()).into(), FakeOutcome::Unimplemented.into()],
            )
            .await;

        assert!(matches!(
            backend.fetch_system_info().await,
            Err(Error::Api { status: 503, .. })
        ));
        assert!(matches!(
            backend.fetch_system_info().await,
            Err(Error::Unimplemented("system info"))
        ));
        assert!(backend.fetch_system_info().await.is_ok());
        assert_eq!(backend.metric_calls(DataKind::SystemInfo).await, 3);
    }

    #[tokio::test]
    async fn activation_only_from_draft() {
        let backend = FakeBackend::demo().await;
        let exam = backend.list_exams(0, 10).await.unwrap().remove(0);
        backend.activate_exam(&exam.id).await.unwrap();
        let err = backend.activate_exam(&exam.id).await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let backend = FakeBackend::demo().await;
        let err = backend
            .create_applicant(CreateApplicantRequest {
                name: "Another Maria".into(),
                email: "MARIA.GONZALEZ@example.com".into(),
                registration_number: None,
            })
            .await
            .unwrap_err();
        assert!(err.user_message().contains("already registered"));
    }

    #[tokio::test]
    async fn demo_seeds_applicants_and_an_exam() {
        let backend = FakeBackend::demo().await;
        assert_eq!(backend.list_applicants().await.unwrap().len(), 3);
        let exams = backend.list_exams(0, 10).await.unwrap();
        assert_eq!(exams.len(), 1);
        assert_eq!(exams[0].total_questions, 2);
    }

    #[tokio::test]
    async fn exams_page_in_creation_order() {
        let backend = FakeBackend::new();
        for n in 1..=12 {
            backend
                .create_exam(CreateExamRequest {
                    title: format!("Exam {}", n),
                    description: None,
                    duration_minutes: 30,
                    questions: vec![NewQuestion {
                        content: "Is 2 even?".into(),
                        question_type: QuestionType::TrueFalse,
                        options: None,
                        correct_answer: "true".into(),
                        points: 1,
                    }],
                })
                .await
                .unwrap();
        }

        let titles = |exams: Vec<Exam>| exams.into_iter().map(|e| e.title).collect::<Vec<_>>();
        let all = titles(backend.list_exams(0, 100).await.unwrap());
        let expected: Vec<String> = (1..=12).map(|n| format!("Exam {}", n)).collect();
        assert_eq!(all, expected);
        assert_eq!(
            titles(backend.list_exams(9, 2).await.unwrap()),
            vec!["Exam 10".to_string(), "Exam 11".to_string()]
        );
    }

    #[tokio::test]
    async fn mutations_show_up_in_activity_logs() {
        let backend = FakeBackend::demo().await;
        let logs = backend.fetch_activity_logs().await.unwrap();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0].source, "ExamManager");
        assert!(logs[0].message.contains("Basic Mathematics"));
    }
}
