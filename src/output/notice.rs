use crate::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Failure,
}

/// Short outcome message printed after a mutating command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub detail: Option<String>,
}

impl Notice {
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            title: title.into(),
            detail: None,
        }
    }

    pub fn failure(title: impl Into<String>, error: &Error) -> Self {
        Self {
            kind: NoticeKind::Failure,
            title: title.into(),
            detail: Some(error.user_message()),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind == NoticeKind::Failure
    }

    /// Prints to stdout, or stderr for failures.
    pub fn emit(&self) {
        match self.kind {
            NoticeKind::Success => println!("{}", self),
            NoticeKind::Failure => eprintln!("{}", self),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let icon = match self.kind {
            NoticeKind::Success => "✅",
            NoticeKind::Failure => "❌",
        };
        write!(f, "{} {}", icon, self.title)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_shows_server_message() {
        let err = Error::Api {
            status: 400,
            message: "Exam is not active".into(),
        };
        let notice = Notice::failure("Could not start sessions", &err);
        assert!(notice.is_failure());
        assert_eq!(notice.to_string(), "❌ Could not start sessions: Exam is not active");
    }

    #[test]
    fn success_with_detail() {
        let notice = Notice::success("Exam created").with_detail("Algebra I");
        assert_eq!(notice.to_string(), "✅ Exam created: Algebra I");
    }
}
