//! Machine-readable execution report.
//!
//! Written once per lane at exit, success or failure, to
//! `<report_dir>/<platform>-<mode>-report.json`. Each run replaces the
//! previous report for the same lane.

use super::{BuildArtifact, BuildContext, Lane, Step, TerminalState, VersionIdentifier};
use crate::error::{ErrorExt, LaneError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Not reached because an earlier step failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: Step,
    pub status: StepStatus,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn succeeded(step: Step, elapsed: Duration) -> Self {
        Self {
            step,
            status: StepStatus::Succeeded,
            duration_ms: elapsed.as_millis(),
            error: None,
        }
    }

    pub fn failed(step: Step, elapsed: Duration, error: String) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            duration_ms: elapsed.as_millis(),
            error: Some(error),
        }
    }

    pub fn skipped(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            duration_ms: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    #[serde(flatten)]
    pub artifact: BuildArtifact,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub lane_id: Uuid,
    pub lane: Lane,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_state: Option<TerminalState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionIdentifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactSummary>,
    /// Whether every ephemeral credential file was removed.
    pub credentials_removed: bool,
}

impl ExecutionReport {
    pub fn new(context: &BuildContext, lane: Lane, started_at: DateTime<Utc>) -> Self {
        Self {
            lane_id: context.lane_id,
            lane,
            started_at,
            finished_at: started_at,
            succeeded: false,
            terminal_state: None,
            failed_step: None,
            error: None,
            steps: Vec::new(),
            version: None,
            artifact: None,
            credentials_removed: true,
        }
    }

    /// Fill in the outcome, marking steps the lane never reached as skipped.
    pub fn finish(
        &mut self,
        records: Vec<StepRecord>,
        result: std::result::Result<TerminalState, &LaneError>,
    ) {
        self.finished_at = Utc::now();
        let reached = records.len();
        self.steps = records;
        self.steps.extend(
            self.lane.steps()[reached.min(self.lane.steps().len())..]
                .iter()
                .map(|s| StepRecord::skipped(*s)),
        );
        match result {
            Ok(state) => {
                self.succeeded = true;
                self.terminal_state = Some(state);
            }
            Err(e) => {
                self.succeeded = false;
                self.failed_step = Some(e.step);
                self.error = Some(e.error.to_string());
            }
        }
    }

    pub fn path(context: &BuildContext, lane: Lane) -> PathBuf {
        context
            .report_dir
            .join(format!("{}-{}-report.json", lane.platform, lane.mode))
    }

    pub async fn write(&self, context: &BuildContext) -> Result<PathBuf> {
        let path = Self::path(context, self.lane);
        tokio::fs::create_dir_all(&context.report_dir)
            .await
            .fs_context("creating report directory", &context.report_dir)?;
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .fs_context("writing execution report", &path)?;
        log::debug!("Wrote execution report {}", path.display());
        Ok(path)
    }
}
