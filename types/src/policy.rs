//! Admission and retry policy values.

use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Throughput and concurrency bounds for one guarded resource.
///
/// ```toml
/// [connectors.shop.rate_limit]
/// requests_per_minute = 30
/// concurrent = 2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Sustained rate; also the token bucket capacity.
    pub requests_per_minute: u32,
    /// Maximum number of in-flight operations.
    pub concurrent: u32,
}

impl AdmissionConfig {
    #[must_use]
    pub const fn new(requests_per_minute: u32, concurrent: u32) -> Self {
        Self {
            requests_per_minute,
            concurrent,
        }
    }

    /// Tokens added per second of elapsed time.
    #[must_use]
    pub fn tokens_per_second(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }

    pub(crate) fn collect_violations(&self, errors: &mut ValidationError) {
        if self.requests_per_minute < 1 {
            errors.push(
                "requests_per_minute",
                "Requests per minute must be greater than 0",
            );
        }
        if self.concurrent < 1 {
            errors.push("concurrent", "Concurrent requests must be greater than 0");
        }
    }
}

/// Classifier entry for retryable error messages.
///
/// Serialized as either a bare string (literal substring) or
/// `{ pattern = "<regex>" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MatcherRepr", into = "MatcherRepr")]
pub enum ErrorMatcher {
    Literal(String),
    Pattern(Regex),
}

impl ErrorMatcher {
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        match self {
            Self::Literal(text) => message.contains(text.as_str()),
            Self::Pattern(regex) => regex.is_match(message),
        }
    }
}

impl PartialEq for ErrorMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MatcherRepr {
    Literal(String),
    Pattern { pattern: String },
}

impl TryFrom<MatcherRepr> for ErrorMatcher {
    type Error = regex::Error;

    fn try_from(repr: MatcherRepr) -> Result<Self, Self::Error> {
        match repr {
            MatcherRepr::Literal(text) => Ok(Self::Literal(text)),
            MatcherRepr::Pattern { pattern } => Self::pattern(&pattern),
        }
    }
}

impl From<ErrorMatcher> for MatcherRepr {
    fn from(matcher: ErrorMatcher) -> Self {
        match matcher {
            ErrorMatcher::Literal(text) => Self::Literal(text),
            ErrorMatcher::Pattern(regex) => Self::Pattern {
                pattern: regex.as_str().to_string(),
            },
        }
    }
}

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper clamp for every delay.
    pub max_delay: Duration,
    /// Multiplier applied after each retry.
    pub backoff_factor: f64,
    /// `None` treats every error as retryable.
    pub retryable_errors: Option<Vec<ErrorMatcher>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
            retryable_errors: None,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_retryable_errors(mut self, matchers: Vec<ErrorMatcher>) -> Self {
        self.retryable_errors = Some(matchers);
        self
    }

    /// True iff `message` should trigger another attempt.
    #[must_use]
    pub fn is_retryable(&self, message: &str) -> bool {
        match &self.retryable_errors {
            None => true,
            Some(matchers) => matchers.iter().any(|m| m.matches(message)),
        }
    }

    /// Delay that follows `current` in the backoff sequence.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_nanos = (current.as_nanos() as f64 * self.backoff_factor).round();
        if !next_nanos.is_finite() || next_nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(next_nanos as u64)
    }

    /// The full worst-case schedule: one delay per retry.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        let mut delays = Vec::with_capacity(retries);
        let mut delay = self.initial_delay;
        for _ in 0..retries {
            delays.push(delay);
            delay = self.next_delay(delay);
        }
        delays
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new("Invalid retry configuration");
        if self.max_attempts < 1 {
            errors.push("max_attempts", "Max attempts must be at least 1");
        }
        if self.max_delay < self.initial_delay {
            errors.push("max_delay", "Max delay must not be less than initial delay");
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            errors.push("backoff_factor", "Backoff factor must be a finite number >= 1");
        }
        errors.into_result()
    }
}
