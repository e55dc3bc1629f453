//! Message handler abstraction for verification and lookup issues.
//!
//! The builder reports every problem it finds through a [`MessageHandler`].
//! The handler decides whether an error aborts the pipeline immediately
//! ([`FailFastHandler`], the default) or is only recorded so that a full scan
//! surfaces all problems in one pass ([`CollectingHandler`]).

use crate::error::{As2ClientError, As2Result};
use std::fmt;

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Non-blocking, informational.
    Warning,
    /// Blocking; whether it aborts immediately depends on the handler policy.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single reported issue.
#[derive(Debug, Clone)]
pub struct Issue {
    /// Issue severity.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Sink for verification and lookup issues.
///
/// `error` returns a `Result` so that a fail-fast policy can abort the caller
/// through `?`. A deferred policy returns `Ok(())` and lets the caller inspect
/// the accumulated issues after the scan completes.
pub trait MessageHandler: Send {
    /// Records a warning. Never blocks.
    fn warn(&mut self, message: String);

    /// Records an error. A fail-fast policy returns `Err` here.
    fn error(&mut self, message: String) -> As2Result<()>;

    /// All issues recorded so far, in reporting order.
    fn issues(&self) -> &[Issue];

    /// Number of recorded warnings.
    fn warning_count(&self) -> usize {
        self.issues()
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Number of recorded errors.
    fn error_count(&self) -> usize {
        self.issues()
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }
}

/// Default policy: the first error aborts immediately.
///
/// Later checks in scan order are not evaluated once an error is hit; install
/// a [`CollectingHandler`] to get the complete list in one pass.
#[derive(Debug, Default)]
pub struct FailFastHandler {
    issues: Vec<Issue>,
}

impl FailFastHandler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageHandler for FailFastHandler {
    fn warn(&mut self, message: String) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            message,
        });
    }

    fn error(&mut self, message: String) -> As2Result<()> {
        self.issues.push(Issue {
            severity: Severity::Error,
            message: message.clone(),
        });
        Err(As2ClientError::Configuration(message))
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

/// Deferred policy: errors are recorded but do not abort the scan.
///
/// The send pipeline still refuses to dispatch when any errors were recorded;
/// it fails with one aggregated message listing all of them.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    issues: Vec<Issue>,
}

impl CollectingHandler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageHandler for CollectingHandler {
    fn warn(&mut self, message: String) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            message,
        });
    }

    fn error(&mut self, message: String) -> As2Result<()> {
        self.issues.push(Issue {
            severity: Severity::Error,
            message,
        });
        Ok(())
    }

    fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_aborts_on_first_error() {
        let mut handler = FailFastHandler::new();
        handler.warn("just a warning".into());
        assert!(handler.error("boom".into()).is_err());
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(handler.error_count(), 1);
    }

    #[test]
    fn fail_fast_error_message_is_preserved() {
        let mut handler = FailFastHandler::new();
        let err = handler.error("the key store is missing".into()).unwrap_err();
        assert!(err.to_string().contains("the key store is missing"));
    }

    #[test]
    fn collecting_handler_defers_errors() {
        let mut handler = CollectingHandler::new();
        assert!(handler.error("first".into()).is_ok());
        assert!(handler.error("second".into()).is_ok());
        handler.warn("third".into());
        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(handler.issues().len(), 3);
        assert_eq!(handler.issues()[0].message, "first");
    }

    #[test]
    fn issue_display_includes_severity() {
        let issue = Issue {
            severity: Severity::Warning,
            message: "check me".into(),
        };
        assert_eq!(issue.to_string(), "[warning] check me");
    }
}
