//! Validation findings shared by the environment validator and the pre-flight checker.

use serde::Serialize;
use std::fmt;

/// A single problem found during validation.
///
/// `subject` names the thing at fault: an environment variable, a file path
/// relative to the project root, or an identifier field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub subject: String,
    pub message: String,
}

impl Finding {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

/// Errors block a lane; warnings are reported and the lane may proceed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Finding::new(subject, message));
    }

    pub fn warning(&mut self, subject: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Finding::new(subject, message));
    }

    /// Record a required variable or file that is absent.
    pub fn missing(&mut self, subject: impl Into<String>) {
        self.error(subject, "is not set");
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Subjects of every error, in the order they were found.
    pub fn error_subjects(&self) -> Vec<&str> {
        self.errors.iter().map(|f| f.subject.as_str()).collect()
    }

    /// Process exit status for this report: non-zero only when errors are present.
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() { 1 } else { 0 }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}
