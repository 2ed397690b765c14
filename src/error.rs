//! Error types for release lanes.
//!
//! Every lane failure maps onto one [`ReleaseError`] variant. The first five
//! variants are the typed failures a lane step can raise; the remaining ones
//! cover reading the project and writing reports.

use crate::lane::{CredentialKind, Step};
use crate::validation::Finding;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for release operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Required variables missing or malformed. Lists every problem at once.
    #[error("configuration error: {}", describe_findings(.findings))]
    Configuration { findings: Vec<Finding> },

    /// An encoded secret could not be decoded
    #[error("failed to decode {kind} from {variable}: {reason}")]
    CredentialDecode {
        kind: CredentialKind,
        variable: String,
        reason: String,
    },

    /// A script the toolchain needs lacks execute rights
    #[error("{} is not executable: {reason}", .path.display())]
    Permission { path: PathBuf, reason: String },

    /// A native build tool failed
    #[error("{tool} failed ({status}){}", describe_diagnostic(.diagnostic))]
    Toolchain {
        tool: String,
        status: String,
        diagnostic: String,
    },

    /// The distribution service rejected an upload
    #[error("upload to {channel} rejected ({rejection}){}", describe_diagnostic(.diagnostic))]
    Publish {
        channel: String,
        rejection: PublishRejection,
        diagnostic: String,
    },

    /// Project manifest or lane settings are unreadable or incomplete
    #[error("invalid project file {}: {reason}", .path.display())]
    Manifest { path: PathBuf, reason: String },

    /// Filesystem operation failed
    #[error("failed {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),
}

/// Why a distribution service refused an upload, read from its diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishRejection {
    Authentication,
    DuplicateVersion,
    UnknownApplication,
    UnsignedArtifact,
    Other,
}

impl std::fmt::Display for PublishRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication failed",
            Self::DuplicateVersion => "version code already used",
            Self::UnknownApplication => "application identifier not registered",
            Self::UnsignedArtifact => "artifact is not signed",
            Self::Other => "rejected",
        })
    }
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

/// A typed failure tagged with the lane step that raised it.
#[derive(Error, Debug)]
#[error("step `{step}` failed: {error}")]
pub struct LaneError {
    pub step: Step,
    #[source]
    pub error: ReleaseError,
}

impl LaneError {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

impl ReleaseError {
    /// Build a configuration error from a single finding.
    pub fn configuration(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            findings: vec![Finding::new(subject, message)],
        }
    }

    /// Names of every variable reported by a configuration error.
    pub fn offending_variables(&self) -> Vec<&str> {
        match self {
            Self::Configuration { findings } => {
                findings.iter().map(|f| f.subject.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration { .. } => 2,
            Self::CredentialDecode { .. } => 3,
            Self::Permission { .. } => 4,
            Self::Toolchain { .. } => 5,
            Self::Publish { .. } => 6,
            _ => 1,
        }
    }
}

fn describe_findings(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe_diagnostic(diagnostic: &str) -> String {
    let trimmed = diagnostic.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

/// Attach the action and path to filesystem errors.
pub trait ErrorExt<T> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| ReleaseError::Filesystem {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}
