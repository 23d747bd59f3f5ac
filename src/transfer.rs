//! Bulk import and export of console data.

use crate::api::models::{CreateApplicantRequest, CreateExamRequest};
use crate::error::{Error, Result};
use crate::metrics::snapshot::ActivityLogEntry;
use crate::output::{self, OutputHandler};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ApplicantRow {
    name: String,
    email: String,
    #[serde(default)]
    registration_number: Option<String>,
}

/// A CSV row that could not be turned into a request. `line` is 1-based and
/// counts the header.
#[derive(Debug)]
pub struct RowError {
    pub line: u64,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct ApplicantImport {
    pub applicants: Vec<CreateApplicantRequest>,
    pub rejected: Vec<RowError>,
}

/// Reads applicants from a CSV file with a `name,email,registration_number`
/// header. Rows that fail validation are collected, not fatal.
pub fn import_applicants_csv(path: &Path) -> Result<ApplicantImport> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    for required in ["name", "email"] {
        if !headers.iter().any(|h| h.eq_ignore_ascii_case(required)) {
            return Err(Error::InvalidInput(format!(
                "{} has no '{}' column",
                path.display(),
                required
            )));
        }
    }

    let mut import = ApplicantImport::default();
    for (index, row) in reader.deserialize::<ApplicantRow>().enumerate() {
        let line = index as u64 + 2;
        let prepared = row.map_err(Error::from).and_then(|row| {
            CreateApplicantRequest {
                name: row.name,
                email: row.email,
                registration_number: row.registration_number,
            }
            .prepare()
        });
        match prepared {
            Ok(request) => import.applicants.push(request),
            Err(error) => {
                log::warn!("Skipping line {} of {}: {}", line, path.display(), error);
                import.rejected.push(RowError { line, error });
            }
        }
    }

    log::info!(
        "Read {} applicant(s) from {} ({} rejected)",
        import.applicants.len(),
        path.display(),
        import.rejected.len()
    );
    Ok(import)
}

/// Writes activity log entries to a `.csv` or `.json` file.
pub async fn export_logs(path: &Path, entries: &[ActivityLogEntry]) -> Result<usize> {
    let mut handler: Box<dyn OutputHandler> = output::file_handler(path)?;
    let written = output::write_all(handler.as_mut(), entries).await?;
    log::info!("Exported {} log entries to {}", written, path.display());
    Ok(written)
}

/// Loads an exam definition from a JSON, YAML or TOML file.
pub fn read_exam_request(path: &Path) -> Result<CreateExamRequest> {
    let content = fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let request: CreateExamRequest = match ext.as_str() {
        "json" => serde_json::from_str(&content)?,
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        _ => {
            return Err(Error::InvalidInput(format!(
                "unsupported exam file format: {}",
                path.display()
            )));
        }
    };
    request.prepare()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::QuestionType;
    use crate::metrics::snapshot::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn import_collects_valid_rows_and_reports_bad_ones() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("applicants.csv");
        fs::write(
            &path,
            "name,email,registration_number\n\
             Maria Gonzalez,maria@uni.edu,REG-001\n\
             Juan Perez,not-an-email,\n\
             Ana Torres , ana@uni.edu ,\n",
        )
        .unwrap();

        let import = import_applicants_csv(&path).unwrap();
        assert_eq!(import.applicants.len(), 2);
        assert_eq!(import.applicants[1].name, "Ana Torres");
        assert!(import.applicants[1].registration_number.is_none());
        assert_eq!(import.rejected.len(), 1);
        assert_eq!(import.rejected[0].line, 3);
    }

    #[test]
    fn import_requires_email_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("applicants.csv");
        fs::write(&path, "name,phone\nMaria,555\n").unwrap();
        assert!(matches!(import_applicants_csv(&path), Err(Error::InvalidInput(_))));
    }

    fn entries() -> Vec<ActivityLogEntry> {
        vec![
            ActivityLogEntry {
                id: "1".into(),
                timestamp: "10:00:00".into(),
                level: LogLevel::Info,
                message: "Evaluation started, 4 workers".into(),
                source: "Evaluator".into(),
            },
            ActivityLogEntry {
                id: "2".into(),
                timestamp: "10:05:00".into(),
                level: LogLevel::Success,
                message: "Evaluation completed".into(),
                source: "Evaluator".into(),
            },
        ]
    }

    #[tokio::test]
    async fn export_logs_as_csv_and_json() {
        let dir = TempDir::new().unwrap();

        let csv_path = dir.path().join("logs.csv");
        assert_eq!(export_logs(&csv_path, &entries()).await.unwrap(), 2);
        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert!(headers.iter().any(|h| h == "message"));
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        let message_col = headers.iter().position(|h| h == "message").unwrap();
        assert_eq!(&rows[0][message_col], "Evaluation started, 4 workers");

        let json_path = dir.path().join("logs.json");
        export_logs(&json_path, &entries()).await.unwrap();
        let parsed: Vec<ActivityLogEntry> =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed, entries());

        assert!(export_logs(&dir.path().join("logs.txt"), &entries()).await.is_err());
    }

    #[test]
    fn exam_definition_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("algebra.yaml");
        fs::write(
            &path,
            r#"
title: Algebra I
duration_minutes: 60
questions:
  - content: "What is 2 + 2?"
    question_type: multiple_choice
    options: ["3", "4", "5", ""]
    correct_answer: "4"
    points: 5
  - content: "Is 7 prime?"
    question_type: true_false
    correct_answer: "true"
    points: 1
"#,
        )
        .unwrap();

        let request = read_exam_request(&path).unwrap();
        assert_eq!(request.totals(), (2, 6));
        assert_eq!(request.questions[0].options.as_ref().unwrap().len(), 3);
        assert_eq!(request.questions[1].question_type, QuestionType::TrueFalse);
    }
}
