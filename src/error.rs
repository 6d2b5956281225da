//! Error types for the conformance harness

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to launch browser session: {0}")]
    Launch(String),

    #[error("Driver failed to start: {0}")]
    DriverStartup(String),

    #[error("Driver readiness check failed after {attempts} attempts")]
    DriverUnready { attempts: usize },

    #[error("Session already torn down")]
    SessionClosed,

    #[error("Timed out after {waited:?} waiting for {what} (last observed: {last})")]
    WaitTimeout {
        what: String,
        waited: Duration,
        last: String,
    },

    #[error("Profile mutated during session: {} ({before} != {after})", .profile.display())]
    ProfileMutated {
        profile: PathBuf,
        before: String,
        after: String,
    },

    #[error("Assertion failed: {check}: expected {expected}, observed {observed}")]
    Assertion {
        check: String,
        expected: String,
        observed: String,
    },

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("WebDriver command failed: {0}")]
    WebDriver(#[from] fantoccini::error::CmdError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Profile database error: {0}")]
    ProfileDb(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl HarnessError {
    /// Reporting category for a failed scenario, so a wait that never fired
    /// is distinguishable from an assertion that observed the wrong thing.
    pub fn kind(&self) -> FailureKind {
        match self {
            HarnessError::Launch(_) => FailureKind::Launch,
            HarnessError::DriverStartup(_) | HarnessError::DriverUnready { .. } => {
                FailureKind::Driver
            }
            HarnessError::WaitTimeout { .. } => FailureKind::Timeout,
            HarnessError::ProfileMutated { .. } => FailureKind::ProfileMutated,
            HarnessError::Assertion { .. } => FailureKind::Assertion,
            HarnessError::WebDriver(_) => FailureKind::Protocol,
            _ => FailureKind::Harness,
        }
    }

    /// True if the error is the WebDriver "no such element" miss, which the
    /// script-blocking scenario must tell apart from every other failure.
    pub fn is_no_such_element(&self) -> bool {
        matches!(
            self,
            HarnessError::WebDriver(fantoccini::error::CmdError::NoSuchElement(_))
        )
    }

    /// True if the error means no alert is currently displayed.
    pub fn is_no_such_alert(&self) -> bool {
        matches!(
            self,
            HarnessError::WebDriver(fantoccini::error::CmdError::NoSuchAlert(_))
        )
    }
}

/// Failure categories surfaced in scenario reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Launch,
    Driver,
    Timeout,
    Assertion,
    ProfileMutated,
    Protocol,
    Harness,
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_and_assertion_are_distinct_kinds() {
        let timeout = HarnessError::WaitTimeout {
            what: "page title".into(),
            waited: Duration::from_secs(60),
            last: "about:blank".into(),
        };
        let assertion = HarnessError::Assertion {
            check: "https-upgrade".into(),
            expected: "https://example.org/".into(),
            observed: "http://example.org/".into(),
        };
        assert_eq!(timeout.kind(), FailureKind::Timeout);
        assert_eq!(assertion.kind(), FailureKind::Assertion);
        assert_ne!(timeout.kind(), assertion.kind());
    }

    #[test]
    fn test_timeout_reports_last_observed_state() {
        let err = HarnessError::WaitTimeout {
            what: "anonymity marker".into(),
            waited: Duration::from_secs(5),
            last: "Untrusted Connection".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("anonymity marker"));
        assert!(msg.contains("Untrusted Connection"));
    }
}
