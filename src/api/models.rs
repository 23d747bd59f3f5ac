//! Wire types exchanged with the exam backend.
//!
//! Every response type derives [`Validate`] so payloads are checked at the
//! boundary before anything else sees them. Request types carry the same
//! rules the console enforces before a request is sent.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError};

pub const MAX_PARALLEL_PROCESSES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamStatus {
    Draft,
    Active,
    InProgress,
    Completed,
    Archived,
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExamStatus::Draft => "draft",
            ExamStatus::Active => "active",
            ExamStatus::InProgress => "in_progress",
            ExamStatus::Completed => "completed",
            ExamStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    pub const ALL: [QuestionType; 4] = [
        QuestionType::MultipleChoice,
        QuestionType::TrueFalse,
        QuestionType::ShortAnswer,
        QuestionType::Essay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown question type '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    pub id: String,
    #[validate(length(min = 1))]
    pub content: String,
    pub question_type: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    #[validate(range(min = 0))]
    pub points: i64,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Exam {
    pub id: String,
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub duration_minutes: u32,
    pub total_questions: u32,
    pub total_points: i64,
    pub status: ExamStatus,
    #[serde(default)]
    #[validate]
    pub questions: Vec<Question>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Applicant {
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub email: String,
    #[serde(default)]
    pub registration_number: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ExamSession {
    pub id: String,
    pub exam_id: String,
    pub applicant_id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ApplicantResponse {
    pub id: String,
    pub session_id: String,
    pub question_id: String,
    pub answer: String,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub points_earned: Option<f64>,
    pub submitted_at: String,
}

/// Result of a backend evaluation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct EvaluationJob {
    #[validate(length(min = 1))]
    pub job_id: String,
    pub status: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub execution_time_seconds: Option<f64>,
    #[serde(default)]
    pub output_data: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ExamStats {
    pub exam_id: String,
    pub total_participants: u64,
    pub completed_sessions: u64,
    #[validate(range(min = 0.0))]
    pub average_score: f64,
    #[serde(default)]
    pub score_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SystemLimits {
    #[validate(range(min = 1))]
    pub max_parallel_processes: u32,
    #[serde(rename = "max_exam_duration")]
    pub max_exam_duration_minutes: u32,
    #[serde(default)]
    pub supported_question_types: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SystemInfo {
    #[serde(rename = "app_name")]
    #[validate(length(min = 1))]
    pub application_name: String,
    pub debug_mode: bool,
    #[serde(rename = "mpi_processor_path")]
    pub evaluator_path: String,
    pub database_connected: bool,
    #[serde(rename = "supported_operations")]
    #[validate]
    pub limits: SystemLimits,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_new_question"))]
pub struct NewQuestion {
    #[validate(length(min = 1))]
    pub content: String,
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[validate(length(min = 1))]
    pub correct_answer: String,
    #[validate(range(min = 1))]
    pub points: i64,
}

impl NewQuestion {
    /// Drops blank options, and options entirely for non multiple-choice questions.
    pub fn normalized(mut self) -> Self {
        self.content = self.content.trim().to_string();
        self.correct_answer = self.correct_answer.trim().to_string();
        self.options = match self.question_type {
            QuestionType::MultipleChoice => self.options.map(|opts| {
                opts.into_iter()
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            }),
            _ => None,
        };
        self
    }
}

fn validate_new_question(q: &NewQuestion) -> std::result::Result<(), ValidationError> {
    match q.question_type {
        QuestionType::MultipleChoice => {
            let options = q.options.as_deref().unwrap_or_default();
            if options.len() < 2 {
                return Err(ValidationError::new("multiple_choice_needs_two_options"));
            }
            if !options.iter().any(|o| o == &q.correct_answer) {
                return Err(ValidationError::new("correct_answer_not_an_option"));
            }
        }
        QuestionType::TrueFalse => {
            if !matches!(q.correct_answer.as_str(), "true" | "false") {
                return Err(ValidationError::new("true_false_answer"));
            }
        }
        QuestionType::ShortAnswer | QuestionType::Essay => {}
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_has_questions"))]
pub struct CreateExamRequest {
    #[validate(length(min = 1))]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[validate(range(min = 1))]
    pub duration_minutes: u32,
    #[validate]
    pub questions: Vec<NewQuestion>,
}

fn validate_has_questions(req: &CreateExamRequest) -> std::result::Result<(), ValidationError> {
    if req.questions.is_empty() {
        return Err(ValidationError::new("exam_needs_questions"));
    }
    Ok(())
}

impl CreateExamRequest {
    /// Normalizes free-form input and validates the result.
    pub fn prepare(mut self) -> Result<Self> {
        self.title = self.title.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.questions = self.questions.into_iter().map(NewQuestion::normalized).collect();
        self.validate()?;
        Ok(self)
    }

    /// Question count and point total the backend will report for this exam.
    pub fn totals(&self) -> (u32, i64) {
        let points = self.questions.iter().map(|q| q.points).sum();
        (self.questions.len() as u32, points)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CreateApplicantRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
}

impl CreateApplicantRequest {
    pub fn prepare(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self.registration_number = self
            .registration_number
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BulkEnrollRequest {
    #[validate(length(min = 1))]
    pub applicant_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SubmitResponseRequest {
    #[validate(length(min = 1))]
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_process_count"))]
pub struct EvaluateExamRequest {
    #[validate(length(min = 1))]
    pub exam_id: String,
    pub parallel_processes: u32,
}

fn validate_process_count(req: &EvaluateExamRequest) -> std::result::Result<(), ValidationError> {
    if !(1..=MAX_PARALLEL_PROCESSES).contains(&req.parallel_processes) {
        return Err(ValidationError::new("parallel_processes_out_of_range"));
    }
    Ok(())
}

impl EvaluateExamRequest {
    pub fn new(exam_id: impl Into<String>, parallel_processes: u32) -> Self {
        Self {
            exam_id: exam_id.into(),
            parallel_processes,
        }
    }

    /// Rejects process counts above what the backend advertises.
    pub fn check_limits(&self, limits: &SystemLimits) -> Result<()> {
        if self.parallel_processes > limits.max_parallel_processes {
            return Err(Error::InvalidInput(format!(
                "parallel_processes {} exceeds backend limit of {}",
                self.parallel_processes, limits.max_parallel_processes
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn algebra_question() -> NewQuestion {
        NewQuestion {
            content: "What is 2 + 2?".into(),
            question_type: QuestionType::MultipleChoice,
            options: Some(vec!["3".into(), "4".into(), " ".into(), "5".into(), "22".into()]),
            correct_answer: "4".into(),
            points: 5,
        }
    }

    #[test]
    fn prepare_drops_blank_options_and_computes_totals() {
        let req = CreateExamRequest {
            title: " Algebra I ".into(),
            description: Some("".into()),
            duration_minutes: 60,
            questions: vec![algebra_question()],
        }
        .prepare()
        .unwrap();

        assert_eq!(req.title, "Algebra I");
        assert!(req.description.is_none());
        assert_eq!(req.questions[0].options.as_ref().unwrap().len(), 4);
        assert_eq!(req.totals(), (1, 5));
    }

    #[test]
    fn correct_answer_must_be_an_option() {
        let mut q = algebra_question();
        q.correct_answer = "7".into();
        let req = CreateExamRequest {
            title: "Algebra I".into(),
            description: None,
            duration_minutes: 60,
            questions: vec![q],
        };
        assert!(matches!(req.prepare(), Err(Error::Validation(_))));
    }

    #[test]
    fn non_multiple_choice_questions_lose_their_options() {
        let q = NewQuestion {
            content: "The earth is round".into(),
            question_type: QuestionType::TrueFalse,
            options: Some(vec!["a".into()]),
            correct_answer: "true".into(),
            points: 1,
        }
        .normalized();
        assert!(q.options.is_none());
        assert!(q.validate().is_ok());

        let body = serde_json::to_value(&q).unwrap();
        assert!(body.get("options").is_none());
    }

    #[test]
    fn exam_requires_questions_and_positive_duration() {
        let req = CreateExamRequest {
            title: "Empty".into(),
            description: None,
            duration_minutes: 0,
            questions: vec![],
        };
        let err = req.prepare().unwrap_err();
        let Error::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.field_errors().contains_key("duration_minutes"));
        assert!(errors.errors().contains_key("__all__"));
    }

    #[test]
    fn applicant_email_is_validated() {
        let bad = CreateApplicantRequest {
            name: "Ana".into(),
            email: "not-an-email".into(),
            registration_number: None,
        };
        assert!(bad.prepare().is_err());

        let good = CreateApplicantRequest {
            name: " Ana ".into(),
            email: "ana@example.com".into(),
            registration_number: Some("  ".into()),
        }
        .prepare()
        .unwrap();
        assert_eq!(good.name, "Ana");
        assert!(good.registration_number.is_none());
    }

    #[test]
    fn evaluation_process_count_is_bounded() {
        assert!(EvaluateExamRequest::new("e1", 0).validate().is_err());
        assert!(EvaluateExamRequest::new("e1", 1).validate().is_ok());
        assert!(EvaluateExamRequest::new("e1", 16).validate().is_ok());
        assert!(EvaluateExamRequest::new("e1", MAX_PARALLEL_PROCESSES).validate().is_ok());
        assert!(EvaluateExamRequest::new("e1", MAX_PARALLEL_PROCESSES + 1).validate().is_err());

        let limits = SystemLimits {
            max_parallel_processes: 8,
            max_exam_duration_minutes: 180,
            supported_question_types: BTreeSet::new(),
        };
        assert!(EvaluateExamRequest::new("e1", 16).check_limits(&limits).is_err());
        assert!(EvaluateExamRequest::new("e1", 8).check_limits(&limits).is_ok());
    }

    #[test]
    fn system_info_maps_wire_names() {
        let raw = r#"{
            "app_name": "Parallel Exam System",
            "debug_mode": false,
            "mpi_processor_path": "/opt/mpi/evaluator",
            "database_connected": true,
            "supported_operations": {
                "max_parallel_processes": 16,
                "supported_question_types": ["multiple_choice", "essay"],
                "max_exam_duration": 240
            }
        }"#;
        let info: SystemInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.evaluator_path, "/opt/mpi/evaluator");
        assert_eq!(info.limits.max_exam_duration_minutes, 240);
        assert!(info.limits.supported_question_types.contains("essay"));
        assert!(info.validate().is_ok());
    }

    #[test]
    fn question_type_parses_case_insensitively() {
        assert_eq!("Multiple_Choice".parse::<QuestionType>().unwrap(), QuestionType::MultipleChoice);
        assert!("matching".parse::<QuestionType>().is_err());
    }
}
