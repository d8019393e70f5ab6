//! Error types for tally

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One failed provider attempt inside the fallback chain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptFailure {
    /// Provider that was called (e.g. "openrouter")
    pub provider: String,
    /// Model identifier sent to the provider
    pub model: String,
    /// Underlying error message
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.provider, self.model, self.message)
    }
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no provider attempts were made".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum Error {
    /// Network failure or timeout talking to a provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("Provider error {status}: {message}")]
    Provider { status: u16, message: String },

    /// Every attempt in the fallback chain failed
    #[error("All providers unavailable: {}", format_attempts(.0))]
    ProviderUnavailable(Vec<AttemptFailure>),

    /// Completion text was not the expected structured format
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("request timed out: {}", err))
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl Error {
    /// Whether the caller should retry later rather than treat this as fatal
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Provider { .. }
                | Error::ProviderUnavailable(_)
                | Error::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
