//! Plain-text views of backend data for the terminal.

use crate::api::models::{Applicant, ApplicantResponse, Exam, ExamStats, SystemInfo};
use crate::filter::ExamStatusCounts;
use crate::metrics::snapshot::{ActivityLogEntry, DashboardSnapshot, DataOrigin, LogLevel, Slice};
use std::fmt::Write;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

pub fn exams(exams: &[Exam]) -> String {
    let counts = ExamStatusCounts::from(exams);
    let mut out = format!(
        "Exams: {} total | {} active | {} in progress | {} completed\n\n",
        counts.total, counts.active, counts.in_progress, counts.completed
    );
    if exams.is_empty() {
        out.push_str("No exams yet.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{:<24} {:<32} {:<12} {:>9} {:>7} {:>8}",
        "ID", "TITLE", "STATUS", "QUESTIONS", "POINTS", "MINUTES"
    );
    for exam in exams {
        let _ = writeln!(
            out,
            "{:<24} {:<32} {:<12} {:>9} {:>7} {:>8}",
            truncate(&exam.id, 24),
            truncate(&exam.title, 32),
            exam.status,
            exam.total_questions,
            exam.total_points,
            exam.duration_minutes
        );
    }
    out
}

pub fn exam_detail(exam: &Exam) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", exam.title, exam.id);
    if let Some(description) = &exam.description {
        let _ = writeln!(out, "  {}", description);
    }
    let _ = writeln!(
        out,
        "  Status: {} | Duration: {} min | Questions: {} | Points: {}",
        exam.status, exam.duration_minutes, exam.total_questions, exam.total_points
    );

    for (n, question) in exam.questions.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n  {}. [{}, {} pt] {}",
            n + 1,
            question.question_type,
            question.points,
            question.content
        );
        let _ = writeln!(out, "     id: {}", question.id);
        for option in question.options.iter().flatten() {
            let marker = if *option == question.correct_answer { "*" } else { " " };
            let _ = writeln!(out, "     {} {}", marker, option);
        }
        if question.options.is_none() {
            let _ = writeln!(out, "     answer: {}", question.correct_answer);
        }
    }
    out
}

pub fn applicants<'a>(applicants: impl IntoIterator<Item = &'a Applicant>) -> String {
    let mut out = format!("{:<24} {:<28} {:<32} {:<12}\n", "ID", "NAME", "EMAIL", "REGISTRATION");
    let mut rows = 0;
    for a in applicants {
        rows += 1;
        let _ = writeln!(
            out,
            "{:<24} {:<28} {:<32} {:<12}",
            truncate(&a.id, 24),
            truncate(&a.name, 28),
            truncate(&a.email, 32),
            a.registration_number.as_deref().unwrap_or("-")
        );
    }
    if rows == 0 {
        return "No applicants found.\n".to_string();
    }
    out
}

pub fn responses(responses: &[ApplicantResponse]) -> String {
    if responses.is_empty() {
        return "No responses submitted.\n".to_string();
    }
    let mut out = format!("{:<24} {:<30} {:<8} {:>6}\n", "QUESTION", "ANSWER", "CORRECT", "POINTS");
    for r in responses {
        let _ = writeln!(
            out,
            "{:<24} {:<30} {:<8} {:>6}",
            truncate(&r.question_id, 24),
            truncate(&r.answer, 30),
            r.is_correct.map_or("-", yes_no),
            r.points_earned.map_or_else(|| "-".to_string(), |p| format!("{:.1}", p))
        );
    }
    out
}

pub fn system_info(info: &SystemInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", info.application_name);
    let _ = writeln!(out, "  Database connected:     {}", yes_no(info.database_connected));
    let _ = writeln!(out, "  Debug mode:             {}", yes_no(info.debug_mode));
    let _ = writeln!(out, "  Evaluator:              {}", info.evaluator_path);
    let _ = writeln!(out, "  Max parallel processes: {}", info.limits.max_parallel_processes);
    let _ = writeln!(out, "  Max exam duration:      {} min", info.limits.max_exam_duration_minutes);
    let types: Vec<&str> = info
        .limits
        .supported_question_types
        .iter()
        .map(String::as_str)
        .collect();
    let _ = writeln!(out, "  Question types:         {}", types.join(", "));
    out
}

pub fn stats(stats: &ExamStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Exam {}", stats.exam_id);
    let _ = writeln!(out, "  Participants:       {}", stats.total_participants);
    let _ = writeln!(out, "  Completed sessions: {}", stats.completed_sessions);
    let _ = writeln!(out, "  Average score:      {:.1}%", stats.average_score);
    if !stats.score_distribution.is_empty() {
        let _ = writeln!(out, "  Score distribution:");
        for (range, count) in &stats.score_distribution {
            let _ = writeln!(out, "    {:>7}  {:<30} {}", range, "#".repeat((*count).min(30) as usize), count);
        }
    }
    out
}

fn level_tag(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO ",
        LogLevel::Success => "OK   ",
        LogLevel::Warning => "WARN ",
        LogLevel::Error => "ERROR",
    }
}

pub fn log_line(entry: &ActivityLogEntry) -> String {
    format!(
        "{} {} [{}] {}",
        entry.timestamp,
        level_tag(entry.level),
        entry.source,
        entry.message
    )
}

pub fn logs<'a>(entries: impl IntoIterator<Item = &'a ActivityLogEntry>) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "{}", log_line(entry));
    }
    if out.is_empty() {
        out.push_str("No log entries match.\n");
    }
    out
}

fn origin_tag<T>(slice: &Slice<T>) -> String {
    match &slice.origin {
        DataOrigin::Remote => format!("live, {}", slice.updated_at.format("%H:%M:%S")),
        DataOrigin::Fallback { unimplemented: true, .. } => "simulated".to_string(),
        DataOrigin::Fallback { .. } => "simulated, backend unavailable".to_string(),
    }
}

/// One-screen summary of a dashboard snapshot.
pub fn dashboard(snapshot: &DashboardSnapshot) -> String {
    let mut out = String::new();
    if snapshot.is_loading {
        out.push_str("Loading...\n");
    }

    if let Some(slice) = &snapshot.processing {
        let m = &slice.value;
        let _ = writeln!(out, "Processing ({})", origin_tag(slice));
        let _ = writeln!(
            out,
            "  {}/{} processed ({:.1}%) | {:.0}/min | remaining {}",
            m.processed_count,
            m.total_count,
            m.progress_percent(),
            m.throughput_per_minute,
            m.estimated_time_remaining
        );
        let _ = writeln!(
            out,
            "  Workers: {}/{} active | avg utilization {:.1}%",
            m.active_worker_count,
            m.workers.len(),
            m.average_utilization
        );
    }

    if let Some(slice) = &snapshot.resources {
        let r = &slice.value.current;
        let _ = writeln!(out, "Resources ({})", origin_tag(slice));
        let _ = writeln!(
            out,
            "  CPU {:.0}% | Memory {:.0}% | Disk {:.0}% | Network {:.0} Mbps",
            r.cpu_percent, r.memory_percent, r.disk_percent, r.network_mbps
        );
    }

    if let Some(slice) = &snapshot.system_info {
        let info = &slice.value;
        let _ = writeln!(out, "System ({})", origin_tag(slice));
        let _ = writeln!(
            out,
            "  {} | database {} | up to {} processes",
            info.application_name,
            if info.database_connected { "connected" } else { "disconnected" },
            info.limits.max_parallel_processes
        );
    }

    if let Some(slice) = &snapshot.activity_logs {
        let _ = writeln!(out, "Recent activity ({})", origin_tag(slice));
        for entry in slice.value.iter().take(5) {
            let _ = writeln!(out, "  {}", log_line(entry));
        }
    }

    if let Some(error) = snapshot.error() {
        let _ = writeln!(out, "⚠ {}", error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metrics::snapshot::ProcessingMetrics;

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn empty_applicant_list() {
        assert_eq!(applicants(&[]), "No applicants found.\n");
    }

    #[test]
    fn dashboard_marks_fallback_data() {
        let mut snapshot = DashboardSnapshot::default();
        snapshot.is_loading = false;
        snapshot.processing = Some(Slice::fallback(
            ProcessingMetrics::new(100, 400, 12.0, "--", vec![]),
            &Error::Internal("connection refused".into()),
        ));

        let text = dashboard(&snapshot);
        assert!(text.contains("100/400 processed (25.0%)"));
        assert!(text.contains("simulated, backend unavailable"));
        assert!(text.contains("connection refused"));
    }
}
