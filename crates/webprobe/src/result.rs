//! Result and error types for webprobe.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for webprobe operations
pub type WebprobeResult<T> = Result<T, WebprobeError>;

/// Maximum number of rendered values kept in an [`Observation`]
pub const MAX_OBSERVED_VALUES: usize = 5;

/// What a single resolution attempt saw in the DOM.
///
/// Carried by [`WebprobeError::Timeout`] so that a failed assertion can be
/// debugged without re-running the test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Observation {
    /// Elements returned by the selector query, before any predicate ran
    pub candidates: usize,
    /// Elements left after the predicate chain
    pub matched: usize,
    /// Rendered text of the first few candidates
    pub values: Vec<String>,
    /// First predicate in the chain that rejected at least one candidate
    pub unmet: Option<String>,
    /// Set when the attempt was cut short by a stale element reference
    pub stale: Option<String>,
}

impl Observation {
    /// Observation of a query that matched nothing
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Mark this observation as interrupted by a stale reference
    #[must_use]
    pub fn with_stale(mut self, message: impl Into<String>) -> Self {
        self.stale = Some(message.into());
        self
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "last attempt saw {} candidate(s), {} matched",
            self.candidates, self.matched
        )?;
        if !self.values.is_empty() {
            write!(f, ", values {:?}", self.values)?;
        }
        if let Some(ref unmet) = self.unmet {
            write!(f, ", unmet: {unmet}")?;
        }
        if let Some(ref stale) = self.stale {
            write!(f, ", stale: {stale}")?;
        }
        Ok(())
    }
}

/// Errors that can occur in webprobe
#[derive(Debug, Error)]
pub enum WebprobeError {
    /// Expectation never held within the retry budget
    #[error("Timed out after {}ms ({attempts} attempt(s)) waiting for {locator}: {observed}", .elapsed.as_millis())]
    Timeout {
        /// Locator description
        locator: String,
        /// Time spent polling
        elapsed: Duration,
        /// Number of resolution attempts
        attempts: usize,
        /// What the last attempt saw
        observed: Observation,
    },

    /// Wrong cardinality at an action or extraction boundary
    #[error("Expectation mismatch for {locator}: expected {expected}, {detail}")]
    ExpectationMismatch {
        /// Locator description
        locator: String,
        /// Cardinality the operation required
        expected: String,
        /// What was found instead
        detail: String,
    },

    /// Element was detached between query and inspection
    #[error("Stale element reference: {message}")]
    StaleReference {
        /// Error message
        message: String,
    },

    /// Browser session is unreachable or returned garbage
    #[error("Driver communication failed: {message}")]
    DriverCommunication {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Selector expression could not be parsed
    #[error("Invalid selector {selector:?}: {message}")]
    InvalidSelector {
        /// The offending selector
        selector: String,
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl WebprobeError {
    /// Shorthand for a stale reference error
    pub fn stale(message: impl Into<String>) -> Self {
        Self::StaleReference {
            message: message.into(),
        }
    }

    /// Shorthand for a driver communication error
    pub fn driver(message: impl Into<String>) -> Self {
        Self::DriverCommunication {
            message: message.into(),
        }
    }

    /// Whether the retry loop may absorb this error and try again
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StaleReference { .. })
    }

    /// Whether this error is a timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error is a cardinality mismatch
    #[must_use]
    pub const fn is_mismatch(&self) -> bool {
        matches!(self, Self::ExpectationMismatch { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_observation() {
        let err = WebprobeError::Timeout {
            locator: "$$(\"#counter-value\") where text == \"1\"".into(),
            elapsed: Duration::from_millis(2000),
            attempts: 41,
            observed: Observation {
                candidates: 1,
                matched: 0,
                values: vec!["0".into()],
                unmet: Some("text == \"1\"".into()),
                stale: None,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("2000ms"));
        assert!(msg.contains("41 attempt(s)"));
        assert!(msg.contains("#counter-value"));
        assert!(msg.contains("[\"0\"]"));
        assert!(msg.contains("unmet: text == \"1\""));
    }

    #[test]
    fn test_classification() {
        assert!(WebprobeError::stale("gone").is_transient());
        assert!(!WebprobeError::driver("session closed").is_transient());
        let mismatch = WebprobeError::ExpectationMismatch {
            locator: "$$(\"a\")".into(),
            expected: "exactly one".into(),
            detail: "2 elements matched".into(),
        };
        assert!(mismatch.is_mismatch());
        assert!(!mismatch.is_timeout());
        assert!(!mismatch.is_transient());
    }

    #[test]
    fn test_observation_display() {
        let obs = Observation::empty().with_stale("node detached");
        let text = obs.to_string();
        assert!(text.contains("0 candidate(s)"));
        assert!(text.contains("stale: node detached"));
    }
}
