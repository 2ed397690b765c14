//! Release lane orchestration.
//!
//! A [`Lane`] is the ordered step plan for one (platform, mode) pair. The
//! [`LaneExecutor`] walks that plan against a [`BuildContext`], delegating to:
//!
//! - [`validator`] - required-variable checks, run before any side effect
//! - [`credentials`] - ephemeral keystore / API key files with guaranteed cleanup
//! - [`version`] - version name and monotonic build code
//! - [`toolchain`] - subprocess invocation of the native tools
//! - [`publisher`] - upload of signed artifacts to their distribution channel
//! - [`report`] - the machine-readable execution report written at lane exit

mod checksum;
pub mod credentials;
mod executor;
pub mod publisher;
pub mod report;
pub mod tool_detection;
pub mod toolchain;
pub mod validator;
pub mod version;

pub use checksum::calculate_sha256;
pub use credentials::{CredentialFile, CredentialKind, CredentialVault, Disposal, SourceEncoding};
pub use executor::{LaneExecutor, LaneOutcome};
pub use publisher::{ArtifactPublisher, Destination};
pub use report::{ExecutionReport, StepRecord, StepStatus};
pub use toolchain::{CommandOutput, CommandRunner, Invocation, ProcessRunner};
pub use validator::EnvironmentValidator;
pub use version::{VersionIdentifier, VersionResolver};

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }

    /// Native project directory relative to the project root.
    pub fn native_dir(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Build,
    Release,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Build => "build",
            Self::Release => "release",
        })
    }
}

/// One unit of work in a lane plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    ValidateEnvironment,
    LoadProject,
    EnsureNativeProject,
    InstallDependencies,
    MaterializeKeystore,
    MaterializeApiKey,
    EnsureExecutable,
    ConfigureSigning,
    ResolveVersion,
    InstallPods,
    NativeBuild,
    SignedBuild,
    Upload,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ValidateEnvironment => "validate-environment",
            Self::LoadProject => "load-project",
            Self::EnsureNativeProject => "ensure-native-project",
            Self::InstallDependencies => "install-dependencies",
            Self::MaterializeKeystore => "materialize-keystore",
            Self::MaterializeApiKey => "materialize-api-key",
            Self::EnsureExecutable => "ensure-executable",
            Self::ConfigureSigning => "configure-signing",
            Self::ResolveVersion => "resolve-version",
            Self::InstallPods => "install-pods",
            Self::NativeBuild => "native-build",
            Self::SignedBuild => "signed-build",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const BUILD_PLAN: &[Step] = &[
    Step::LoadProject,
    Step::EnsureNativeProject,
    Step::InstallDependencies,
    Step::NativeBuild,
];

const ANDROID_RELEASE_PLAN: &[Step] = &[
    Step::ValidateEnvironment,
    Step::LoadProject,
    Step::MaterializeKeystore,
    Step::EnsureExecutable,
    Step::ResolveVersion,
    Step::SignedBuild,
    Step::Upload,
];

const IOS_RELEASE_PLAN: &[Step] = &[
    Step::ValidateEnvironment,
    Step::LoadProject,
    Step::MaterializeApiKey,
    Step::ConfigureSigning,
    Step::ResolveVersion,
    Step::InstallPods,
    Step::SignedBuild,
    Step::Upload,
];

/// A named, ordered pipeline for one platform and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Lane {
    pub platform: Platform,
    pub mode: Mode,
}

impl Lane {
    pub fn new(platform: Platform, mode: Mode) -> Self {
        Self { platform, mode }
    }

    pub fn steps(&self) -> &'static [Step] {
        match (self.platform, self.mode) {
            (_, Mode::Build) => BUILD_PLAN,
            (Platform::Android, Mode::Release) => ANDROID_RELEASE_PLAN,
            (Platform::Ios, Mode::Release) => IOS_RELEASE_PLAN,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.platform, self.mode)
    }
}

/// Non-public distribution channels a release lane can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Play Console track, release left as a draft.
    Draft,
    /// TestFlight.
    Beta,
}

/// Where a successful lane ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state", content = "channel")]
pub enum TerminalState {
    BuiltUnsigned,
    Published(Channel),
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltUnsigned => f.write_str("built (unsigned)"),
            Self::Published(Channel::Draft) => f.write_str("published (draft)"),
            Self::Published(Channel::Beta) => f.write_str("published (beta)"),
        }
    }
}

/// Output of a native build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub platform: Platform,
    pub path: PathBuf,
    pub version_name: Option<String>,
    pub version_code: Option<u64>,
    pub signed: bool,
}

/// Paths and identity shared by every step of one lane invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub project_root: PathBuf,
    pub platform: Platform,
    /// Parent of the per-lane credential directory.
    pub ephemeral_root: PathBuf,
    /// Where the execution report is written.
    pub report_dir: PathBuf,
    pub lane_id: Uuid,
}

impl BuildContext {
    pub fn new(project_root: impl Into<PathBuf>, platform: Platform) -> Self {
        let project_root = project_root.into();
        Self {
            report_dir: project_root.join(".release"),
            project_root,
            platform,
            ephemeral_root: std::env::temp_dir(),
            lane_id: Uuid::new_v4(),
        }
    }

    pub fn with_ephemeral_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ephemeral_root = dir.into();
        self
    }

    /// `android/` or `ios/` under the project root.
    pub fn native_dir(&self) -> PathBuf {
        self.project_root.join(self.platform.native_dir())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_plans_sign_before_upload() {
        for platform in [Platform::Android, Platform::Ios] {
            let steps = Lane::new(platform, Mode::Release).steps();
            let sign = steps.iter().position(|s| *s == Step::SignedBuild).unwrap();
            let upload = steps.iter().position(|s| *s == Step::Upload).unwrap();
            assert!(sign < upload);
            assert_eq!(steps[0], Step::ValidateEnvironment);
        }
    }

    #[test]
    fn build_plan_never_uploads() {
        let steps = Lane::new(Platform::Ios, Mode::Build).steps();
        assert!(!steps.contains(&Step::Upload));
        assert_eq!(steps.last(), Some(&Step::NativeBuild));
    }
}
