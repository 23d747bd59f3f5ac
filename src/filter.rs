//! Search and summary helpers used by list views.

use crate::api::models::{Applicant, Exam, ExamStatus};
use crate::error::Error;
use crate::metrics::snapshot::{ActivityLogEntry, LogLevel};
use serde::Serialize;
use std::str::FromStr;

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Applicants whose name, email or registration number contains `term`,
/// ignoring case. A blank term matches everyone.
pub fn filter_applicants<'a>(applicants: &'a [Applicant], term: &str) -> Vec<&'a Applicant> {
    let needle = term.trim().to_lowercase();
    applicants
        .iter()
        .filter(|a| {
            needle.is_empty()
                || contains_ignore_case(&a.name, &needle)
                || contains_ignore_case(&a.email, &needle)
                || a.registration_number
                    .as_deref()
                    .is_some_and(|r| contains_ignore_case(r, &needle))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    #[default]
    All,
    Only(LogLevel),
}

impl LevelFilter {
    pub fn matches(&self, level: LogLevel) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Only(wanted) => *wanted == level,
        }
    }
}

impl FromStr for LevelFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level = match s.trim().to_lowercase().as_str() {
            "all" => return Ok(LevelFilter::All),
            "info" => LogLevel::Info,
            "success" => LogLevel::Success,
            "warning" | "warn" => LogLevel::Warning,
            "error" => LogLevel::Error,
            other => {
                return Err(Error::InvalidInput(format!(
                    "unknown log level '{}' (expected all, info, success, warning or error)",
                    other
                )));
            }
        };
        Ok(LevelFilter::Only(level))
    }
}

/// Log entries whose message or source contains `term` and whose level
/// passes `level`.
pub fn filter_logs<'a>(
    entries: &'a [ActivityLogEntry],
    term: &str,
    level: LevelFilter,
) -> Vec<&'a ActivityLogEntry> {
    let needle = term.trim().to_lowercase();
    entries
        .iter()
        .filter(|e| level.matches(e.level))
        .filter(|e| {
            needle.is_empty()
                || contains_ignore_case(&e.message, &needle)
                || contains_ignore_case(&e.source, &needle)
        })
        .collect()
}

/// Headline counters of the exams overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExamStatusCounts {
    pub total: usize,
    pub active: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl From<&[Exam]> for ExamStatusCounts {
    fn from(exams: &[Exam]) -> Self {
        exams.iter().fold(
            ExamStatusCounts {
                total: exams.len(),
                ..Default::default()
            },
            |mut counts, exam| {
                match exam.status {
                    ExamStatus::Active => counts.active += 1,
                    ExamStatus::InProgress => counts.in_progress += 1,
                    ExamStatus::Completed => counts.completed += 1,
                    ExamStatus::Draft | ExamStatus::Archived => {}
                }
                counts
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applicant(id: &str, name: &str, email: &str, reg: Option<&str>) -> Applicant {
        Applicant {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            registration_number: reg.map(Into::into),
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn applicants() -> Vec<Applicant> {
        vec![
            applicant("a1", "Maria Gonzalez", "maria@uni.edu", Some("REG-001")),
            applicant("a2", "Juan Perez", "juan@college.org", Some("REG-002")),
            applicant("a3", "Ana Torres", "ana@uni.edu", None),
        ]
    }

    #[test]
    fn applicant_search_by_email_substring() {
        let list = applicants();
        let found = filter_applicants(&list, "COLLEGE");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a2");

        assert!(filter_applicants(&list, "nobody@nowhere").is_empty());
        assert_eq!(filter_applicants(&list, "  ").len(), 3);
        assert_eq!(filter_applicants(&list, "reg-00").len(), 2);
    }

    fn entry(id: &str, level: LogLevel, message: &str, source: &str) -> ActivityLogEntry {
        ActivityLogEntry {
            id: id.into(),
            timestamp: "12:00:00".into(),
            level,
            message: message.into(),
            source: source.into(),
        }
    }

    #[test]
    fn log_search_combines_term_and_level() {
        let logs = vec![
            entry("1", LogLevel::Info, "Evaluation started", "Evaluator"),
            entry("2", LogLevel::Error, "Worker 3 crashed", "Evaluator"),
            entry("3", LogLevel::Success, "Exam created", "ExamManager"),
        ];

        assert_eq!(filter_logs(&logs, "evaluator", LevelFilter::All).len(), 2);
        let errors = filter_logs(&logs, "", "error".parse().unwrap());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, "2");
        assert!(filter_logs(&logs, "exam", LevelFilter::Only(LogLevel::Error)).is_empty());
        assert!("verbose".parse::<LevelFilter>().is_err());
    }

    #[test]
    fn status_counts() {
        let exam = |status| Exam {
            id: "e".into(),
            title: "t".into(),
            description: None,
            duration_minutes: 30,
            total_questions: 0,
            total_points: 0,
            status,
            questions: vec![],
            created_at: "2024-01-01T00:00:00Z".into(),
            updated_at: None,
        };
        let exams = vec![
            exam(ExamStatus::Draft),
            exam(ExamStatus::Active),
            exam(ExamStatus::Active),
            exam(ExamStatus::Completed),
        ];
        let counts = ExamStatusCounts::from(exams.as_slice());
        assert_eq!(
            counts,
            ExamStatusCounts {
                total: 4,
                active: 2,
                in_progress: 0,
                completed: 1
            }
        );
    }
}
