use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed {what} payload: {reason}")]
    MalformedPayload { what: &'static str, reason: String },

    #[error("Endpoint not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("Not signed in; run `exam-console login --token <TOKEN>` first")]
    Unauthenticated,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub const GENERIC_FAILURE: &str = "The request could not be completed. Please try again.";

impl Error {
    /// Text suitable for a transient notice to the operator.
    pub fn user_message(&self) -> String {
        match self {
            Error::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            Error::Validation(e) => format!("Invalid input: {}", e),
            Error::InvalidInput(msg) => msg.clone(),
            Error::Unauthenticated => self.to_string(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }

    /// Whether this failure means the backend simply has no such endpoint.
    pub fn is_unimplemented(&self) -> bool {
        match self {
            Error::Unimplemented(_) => true,
            Error::Api { status, .. } => *status == 404 || *status == 501,
            _ => false,
        }
    }

    pub fn malformed(what: &'static str, reason: impl Into<String>) -> Self {
        Error::MalformedPayload {
            what,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_surface_server_message() {
        let err = Error::Api {
            status: 409,
            message: "Applicant already enrolled".into(),
        };
        assert_eq!(err.user_message(), "Applicant already enrolled");
    }

    #[test]
    fn blank_server_message_falls_back_to_generic_text() {
        let err = Error::Api {
            status: 500,
            message: "  ".into(),
        };
        assert_eq!(err.user_message(), GENERIC_FAILURE);
        assert_eq!(Error::Internal("boom".into()).user_message(), GENERIC_FAILURE);
    }

    #[test]
    fn not_found_and_not_implemented_count_as_unimplemented() {
        assert!(Error::Unimplemented("activity logs").is_unimplemented());
        assert!(Error::Api { status: 404, message: String::new() }.is_unimplemented());
        assert!(Error::Api { status: 501, message: String::new() }.is_unimplemented());
        assert!(!Error::Api { status: 500, message: String::new() }.is_unimplemented());
    }
}
