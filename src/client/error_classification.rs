//! Error classification logic
//!
//! Maps any failure to a category with severity and recoverability. Pure and
//! synchronous: the classifier never logs, sleeps or retries.

use crate::Error;
use serde::Serialize;
use std::time::Duration;

/// Suggested wait after a rate-limit/quota failure.
pub const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Timeout,
    Network,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recoverable: bool,
    pub suggested_retry_delay: Option<Duration>,
    /// The original error message, unmodified.
    pub message: String,
}

impl ClassifiedError {
    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::Auth => {
                "Authentication failed. Please contact an administrator.".to_string()
            }
            ErrorKind::RateLimit => {
                "The service is busy (rate limit reached). Please try again in a minute."
                    .to_string()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".to_string(),
            ErrorKind::Network => {
                "Network connection problem. Please check your connection and try again."
                    .to_string()
            }
            ErrorKind::Unknown => format!("Unexpected error: {}", self.message),
        }
    }
}

// Order matters: the first matching group wins, so auth is checked before
// anything a rate-limited or timed-out auth failure might also mention.
const AUTH_PATTERNS: &[&str] = &[
    "api key",
    "api_key",
    "apikey",
    "authentication",
    "unauthorized",
    "invalid credentials",
];
const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "quota",
    "too many requests",
];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out"];
const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "fetch",
    "connection",
    "connect error",
    "dns",
    "socket",
];

fn matches_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(err: &Error) -> ClassifiedError {
        Self::classify_message(&err.to_string())
    }

    pub fn classify_message(message: &str) -> ClassifiedError {
        let m = message.to_lowercase();

        let (kind, severity, recoverable, suggested_retry_delay) =
            if matches_any(&m, AUTH_PATTERNS) {
                (ErrorKind::Auth, Severity::Critical, false, None)
            } else if matches_any(&m, RATE_LIMIT_PATTERNS) {
                (
                    ErrorKind::RateLimit,
                    Severity::Warning,
                    true,
                    Some(RATE_LIMIT_RETRY_DELAY),
                )
            } else if matches_any(&m, TIMEOUT_PATTERNS) {
                (ErrorKind::Timeout, Severity::Warning, true, None)
            } else if matches_any(&m, NETWORK_PATTERNS) {
                (ErrorKind::Network, Severity::Warning, true, None)
            } else {
                (ErrorKind::Unknown, Severity::Error, true, None)
            };

        ClassifiedError {
            kind,
            severity,
            recoverable,
            suggested_retry_delay,
            message: message.to_string(),
        }
    }
}
