//! Command line interface for mobile release lanes.
//!
//! This module provides argument parsing, command execution, and user
//! feedback. Every command ends with a single summary line.

mod args;
mod output;

pub use args::{Args, Command, LaneArgs, PreflightArgs, ProjectArgs, RuntimeConfig};
pub use output::OutputManager;

use crate::config::EnvSnapshot;
use crate::error::{CliError, Result};
use crate::lane::{BuildContext, ExecutionReport, LaneExecutor, ProcessRunner, tool_detection};
use crate::preflight::{self, ProjectSnapshot};
use crate::validation::ValidationReport;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    args.validate()
        .map_err(|reason| CliError::InvalidArguments { reason })?;
    let config = RuntimeConfig::from(&args);

    match &args.command {
        Command::Lane(lane) => run_lane(lane, &config, EnvSnapshot::capture()).await,
        Command::Preflight(preflight) => run_preflight(preflight, &config),
    }
}

async fn run_lane(args: &LaneArgs, config: &RuntimeConfig, env: EnvSnapshot) -> Result<i32> {
    let output = config.output();
    let lane = args.lane();
    let project_root = args.project.resolve()?;

    let mut context = BuildContext::new(&project_root, lane.platform);
    if let Some(dir) = &args.ephemeral_dir {
        context = context.with_ephemeral_root(dir);
    }

    output.section(&format!("{} lane", lane))?;
    output.indent(&format!("project: {}", project_root.display()))?;
    output.indent(&format!("lane id: {}", context.lane_id))?;

    let runner = ProcessRunner::new();
    let result = LaneExecutor::new(lane, &context, &env, &runner).run().await;

    match result {
        Ok(outcome) => {
            for record in &outcome.steps {
                output.verbose(&format!("{} ({} ms)", record.step, record.duration_ms))?;
            }
            output.success(&format!("Artifact: {}", outcome.artifact.path.display()))?;
            if let Some(version) = &outcome.version {
                output.indent(&format!("version: {version}"))?;
            }
            if let Some(path) = &outcome.report_path {
                output.indent(&format!("report: {}", path.display()))?;
            }
            output.summary(true, &format!("{lane}: {}", outcome.terminal))?;
            Ok(0)
        }
        Err(e) => {
            output.error(&e.to_string())?;
            for variable in e.error.offending_variables() {
                output.indent(&format!("missing or invalid: {variable}"))?;
            }
            output.indent(&format!(
                "report: {}",
                ExecutionReport::path(&context, lane).display()
            ))?;
            output.summary(false, &format!("{lane}: failed at step `{}`", e.step))?;
            Ok(e.exit_code())
        }
    }
}

fn run_preflight(args: &PreflightArgs, config: &RuntimeConfig) -> Result<i32> {
    let output = config.output();
    let project_root = args.project.resolve()?;
    output.section(&format!("Pre-flight checks for {}", project_root.display()))?;

    let snapshot = ProjectSnapshot::capture(&project_root)?;
    let mut report = preflight::validate(&snapshot);
    if args.check_tools {
        report.merge(tool_report());
    }

    for finding in &report.errors {
        output.error(&finding.to_string())?;
    }
    for finding in &report.warnings {
        output.warn(&finding.to_string())?;
    }

    let summary = format!(
        "pre-flight: {} error(s), {} warning(s)",
        report.errors.len(),
        report.warnings.len()
    );
    output.summary(!report.has_errors(), &summary)?;
    Ok(report.exit_code())
}

/// PATH warnings for the external tools lanes invoke.
fn tool_report() -> ValidationReport {
    let mut report = ValidationReport::new();
    for (tool, purpose) in tool_detection::missing_tools() {
        report.warning(tool, format!("not found on PATH (needed for {purpose})"));
    }
    report
}
