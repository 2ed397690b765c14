//! Step-by-step execution of a lane plan.
//!
//! Steps run strictly in plan order and the first failure stops the lane.
//! Whatever happens, the credential vault is closed and the execution report
//! is written before [`LaneExecutor::run`] returns.

use super::checksum::calculate_sha256;
use super::credentials::{CredentialFile, CredentialVault};
use super::publisher::{ArtifactPublisher, Destination};
use super::report::{ExecutionReport, StepRecord};
use super::toolchain::{CommandRunner, Invocation};
use super::validator::EnvironmentValidator;
use super::version::{VersionIdentifier, VersionResolver};
use super::{BuildArtifact, BuildContext, Lane, Mode, Platform, Step, TerminalState};
use crate::config::{AndroidCredentials, EnvSnapshot, IosCredentials, LaneConfig, SigningMethod};
use crate::error::{LaneError, ReleaseError, Result};
use crate::metadata::Project;
use crate::utils::fs;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Gradle project property prefix read from the environment.
const GRADLE_PROPERTY: &str = "ORG_GRADLE_PROJECT_";

/// Run one step body, record it, and bail out of the lane on failure.
macro_rules! step {
    ($records:expr, $step:expr, $body:expr) => {{
        let step: Step = $step;
        log::info!("▶ {}", step);
        let started = Instant::now();
        let outcome: Result<_> = $body.await;
        match outcome {
            Ok(value) => {
                $records.push(StepRecord::succeeded(step, started.elapsed()));
                value
            }
            Err(error) => {
                log::error!("✗ {}: {}", step, error);
                $records.push(StepRecord::failed(step, started.elapsed(), error.to_string()));
                return Err(LaneError { step, error });
            }
        }
    }};
}

/// What a successful lane produced.
#[derive(Debug, Clone)]
pub struct LaneOutcome {
    pub terminal: TerminalState,
    pub artifact: BuildArtifact,
    /// Present for release lanes.
    pub version: Option<VersionIdentifier>,
    pub steps: Vec<StepRecord>,
    /// Where the execution report landed, if it could be written.
    pub report_path: Option<PathBuf>,
}

/// Mutable state of one lane run, kept outside the step functions so it
/// survives an early return.
#[derive(Default)]
struct LaneRun {
    records: Vec<StepRecord>,
    vault: Option<CredentialVault>,
    version: Option<VersionIdentifier>,
    artifact: Option<BuildArtifact>,
}

type LaneResult = std::result::Result<(TerminalState, BuildArtifact), LaneError>;

pub struct LaneExecutor<'a, R> {
    lane: Lane,
    context: &'a BuildContext,
    env: &'a EnvSnapshot,
    runner: &'a R,
}

impl<'a, R: CommandRunner> LaneExecutor<'a, R> {
    pub fn new(lane: Lane, context: &'a BuildContext, env: &'a EnvSnapshot, runner: &'a R) -> Self {
        Self {
            lane,
            context,
            env,
            runner,
        }
    }

    /// Execute the lane's plan.
    ///
    /// # Errors
    ///
    /// A [`LaneError`] naming the first step that failed. Steps after it are
    /// never started.
    pub async fn run(&self) -> std::result::Result<LaneOutcome, LaneError> {
        let started_at = Utc::now();
        log::info!(
            "Starting {} lane ({}) in {}",
            self.lane,
            self.context.lane_id,
            self.context.project_root.display()
        );

        let mut run = LaneRun::default();
        let result = match (self.lane.platform, self.lane.mode) {
            (_, Mode::Build) => self.build(&mut run).await,
            (Platform::Android, Mode::Release) => self.android_release(&mut run).await,
            (Platform::Ios, Mode::Release) => self.ios_release(&mut run).await,
        };

        let (result, credentials_removed) = self.close_vault(&mut run, result);

        let mut report = ExecutionReport::new(self.context, self.lane, started_at);
        report.credentials_removed = credentials_removed;
        report.version = run.version.clone();
        if let Some(artifact) = &run.artifact {
            let sha256 = match calculate_sha256(&artifact.path).await {
                Ok(sum) => Some(sum),
                Err(e) => {
                    log::warn!("Could not checksum {}: {}", artifact.path.display(), e);
                    None
                }
            };
            report.artifact = Some(super::report::ArtifactSummary {
                artifact: artifact.clone(),
                sha256,
            });
        }
        report.finish(
            std::mem::take(&mut run.records),
            result.as_ref().map(|(state, _)| *state),
        );

        let report_path = match report.write(self.context).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Could not write execution report: {}", e);
                None
            }
        };

        let (terminal, artifact) = result?;
        log::info!("✓ {} lane finished: {}", self.lane, terminal);
        Ok(LaneOutcome {
            terminal,
            artifact,
            version: run.version,
            steps: report.steps,
            report_path,
        })
    }

    /// Remove every ephemeral credential. A cleanup failure fails an
    /// otherwise successful lane.
    fn close_vault(&self, run: &mut LaneRun, result: LaneResult) -> (LaneResult, bool) {
        let Some(vault) = run.vault.take() else {
            return (result, true);
        };
        match vault.close() {
            Ok(()) => (result, true),
            Err(error) => {
                log::error!("Ephemeral credentials were not fully removed: {}", error);
                let step = match self.lane.platform {
                    Platform::Android => Step::MaterializeKeystore,
                    Platform::Ios => Step::MaterializeApiKey,
                };
                let result = match result {
                    Ok(_) => Err(LaneError { step, error }),
                    Err(e) => Err(e),
                };
                (result, false)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Plans
    // ---------------------------------------------------------------------

    async fn build(&self, run: &mut LaneRun) -> LaneResult {
        let LaneRun {
            records, artifact, ..
        } = run;

        let project = step!(records, Step::LoadProject, self.load_project());
        step!(records, Step::EnsureNativeProject, self.ensure_native_project());
        step!(records, Step::InstallDependencies, self.install_dependencies());
        let built = step!(records, Step::NativeBuild, self.native_build(&project));

        *artifact = Some(built.clone());
        Ok((TerminalState::BuiltUnsigned, built))
    }

    async fn android_release(&self, run: &mut LaneRun) -> LaneResult {
        let LaneRun {
            records,
            vault,
            version,
            artifact,
        } = run;

        let config = step!(records, Step::ValidateEnvironment, self.validate());
        let credentials = config
            .android()
            .map_err(|error| LaneError {
                step: Step::ValidateEnvironment,
                error,
            })?;
        let project = step!(records, Step::LoadProject, self.load_project());
        let keystore = step!(
            records,
            Step::MaterializeKeystore,
            self.materialize_keystore(vault, credentials)
        );
        let gradlew = self.context.native_dir().join("gradlew");
        step!(records, Step::EnsureExecutable, self.ensure_executable(&gradlew));
        let resolved = step!(records, Step::ResolveVersion, self.resolve_version(&project, &config));
        *version = Some(resolved.clone());

        let signed = step!(
            records,
            Step::SignedBuild,
            self.android_signed_build(&gradlew, credentials, &keystore, &resolved)
        );
        *artifact = Some(signed.clone());

        let destination = Destination::PlayStore {
            package_name: project.manifest.android_package().map_err(|error| LaneError {
                step: Step::Upload,
                error,
            })?,
            service_account: &credentials.service_account_json,
            track: project.settings.android.track,
        };
        let channel = step!(records, Step::Upload, self.publish(&signed, &destination));
        Ok((TerminalState::Published(channel), signed))
    }

    async fn ios_release(&self, run: &mut LaneRun) -> LaneResult {
        let LaneRun {
            records,
            vault,
            version,
            artifact,
        } = run;

        let config = step!(records, Step::ValidateEnvironment, self.validate());
        let credentials = config.ios().map_err(|error| LaneError {
            step: Step::ValidateEnvironment,
            error,
        })?;
        let project = step!(records, Step::LoadProject, self.load_project());
        let api_key = step!(
            records,
            Step::MaterializeApiKey,
            self.materialize_api_key(vault, credentials)
        );
        step!(
            records,
            Step::ConfigureSigning,
            self.configure_signing(&project, credentials, &api_key)
        );
        let resolved = step!(records, Step::ResolveVersion, self.resolve_version(&project, &config));
        *version = Some(resolved.clone());

        let ios_dir = self.context.native_dir();
        step!(records, Step::InstallPods, self.install_pods(&ios_dir));

        let signed = step!(
            records,
            Step::SignedBuild,
            self.ios_signed_build(&project, credentials, &resolved)
        );
        *artifact = Some(signed.clone());

        let destination = Destination::TestFlight {
            api_key_path: &api_key.path,
            team_id: match &credentials.signing {
                SigningMethod::Manual(manual) => manual.itc_team_id.as_deref(),
                SigningMethod::Automated(_) => None,
            },
        };
        let channel = step!(records, Step::Upload, self.publish(&signed, &destination));
        Ok((TerminalState::Published(channel), signed))
    }

    // ---------------------------------------------------------------------
    // Steps
    // ---------------------------------------------------------------------

    async fn validate(&self) -> Result<LaneConfig> {
        let config = EnvironmentValidator::validate(&self.lane, self.env)?;
        log::info!("Environment complete for {}", self.lane);
        Ok(config)
    }

    async fn load_project(&self) -> Result<Project> {
        let project = Project::load(&self.context.project_root)?;
        if self.lane.mode == Mode::Release {
            match self.lane.platform {
                Platform::Android => project.manifest.android_package().map(|_| ())?,
                Platform::Ios => project.manifest.ios_bundle_identifier().map(|_| ())?,
            }
        }
        Ok(project)
    }

    async fn ensure_native_project(&self) -> Result<()> {
        let native_dir = self.context.native_dir();
        if native_dir.is_dir() {
            log::info!("Native project present at {}", native_dir.display());
            return Ok(());
        }

        let invocation = Invocation::new(
            Step::EnsureNativeProject,
            "npx",
            &self.context.project_root,
        )
        .args(["expo", "prebuild", "--platform", self.lane.platform.as_str(), "--no-install"]);
        self.runner.run(&invocation).await?.check(&invocation)?;

        if !native_dir.is_dir() {
            return Err(ReleaseError::Toolchain {
                tool: invocation.tool(),
                status: "exit code 0".to_string(),
                diagnostic: format!("prebuild did not create {}", native_dir.display()),
            });
        }
        Ok(())
    }

    async fn install_dependencies(&self) -> Result<()> {
        let root = &self.context.project_root;
        if root.join("node_modules").is_dir() {
            log::info!("JavaScript dependencies already installed");
        } else {
            let invocation = js_install_invocation(root);
            self.runner.run(&invocation).await?.check(&invocation)?;
        }

        if self.lane.platform == Platform::Ios {
            let ios_dir = self.context.native_dir();
            if ios_dir.join("Pods").is_dir() {
                log::info!("CocoaPods already installed");
            } else {
                self.install_pods(&ios_dir).await?;
            }
        }
        Ok(())
    }

    async fn install_pods(&self, ios_dir: &Path) -> Result<()> {
        let invocation = Invocation::new(Step::InstallPods, "pod", ios_dir).arg("install");
        self.runner.run(&invocation).await?.check(&invocation)?;
        Ok(())
    }

    async fn native_build(&self, project: &Project) -> Result<BuildArtifact> {
        let native_dir = self.context.native_dir();

        let (invocation, path) = match self.lane.platform {
            Platform::Android => {
                let gradlew = native_dir.join("gradlew");
                fs::ensure_executable(&gradlew).await?;
                (
                    Invocation::new(Step::NativeBuild, &gradlew, &native_dir).arg("assembleDebug"),
                    native_dir.join("app/build/outputs/apk/debug/app-debug.apk"),
                )
            }
            Platform::Ios => {
                let scheme = project.ios_scheme();
                let workspace = self.context.resolve(&project.ios_workspace());
                (
                    Invocation::new(Step::NativeBuild, "xcodebuild", &native_dir)
                        .arg("-workspace")
                        .arg(workspace.display().to_string())
                        .arg("-scheme")
                        .arg(scheme.as_str())
                        .args([
                            "-configuration",
                            "Debug",
                            "-sdk",
                            "iphonesimulator",
                            "-derivedDataPath",
                        ])
                        .arg(native_dir.join("build").display().to_string())
                        .args(["CODE_SIGNING_ALLOWED=NO", "build"]),
                    native_dir
                        .join("build/Build/Products/Debug-iphonesimulator")
                        .join(format!("{scheme}.app")),
                )
            }
        };

        self.runner.run(&invocation).await?.check(&invocation)?;
        let artifact = expect_artifact(&invocation, path)?;
        log::info!("✓ Built {}", artifact.display());

        Ok(BuildArtifact {
            platform: self.lane.platform,
            path: artifact,
            version_name: Some(project.manifest.version.clone()),
            version_code: None,
            signed: false,
        })
    }

    async fn materialize_keystore(
        &self,
        vault: &mut Option<CredentialVault>,
        credentials: &AndroidCredentials,
    ) -> Result<CredentialFile> {
        open_vault(vault, self.context)?.materialize_keystore(&credentials.keystore, self.context)
    }

    async fn materialize_api_key(
        &self,
        vault: &mut Option<CredentialVault>,
        credentials: &IosCredentials,
    ) -> Result<CredentialFile> {
        open_vault(vault, self.context)?.materialize_api_key(&credentials.api_key)
    }

    async fn ensure_executable(&self, script: &Path) -> Result<()> {
        if fs::ensure_executable(script).await? {
            log::info!("Added execute permission to {}", script.display());
        }
        Ok(())
    }

    async fn resolve_version(&self, project: &Project, config: &LaneConfig) -> Result<VersionIdentifier> {
        let version = VersionResolver::resolve(&project.manifest, &config.ci, self.lane.platform)?;
        log::info!("Version {}", version);
        Ok(version)
    }

    async fn configure_signing(
        &self,
        project: &Project,
        credentials: &IosCredentials,
        api_key: &CredentialFile,
    ) -> Result<()> {
        let automated = match &credentials.signing {
            SigningMethod::Manual(_) => {
                log::info!("Using provisioning profiles installed on this machine");
                return Ok(());
            }
            SigningMethod::Automated(automated) => automated,
        };

        let mut invocation = Invocation::new(
            Step::ConfigureSigning,
            "fastlane",
            &self.context.project_root,
        )
        .args(["run", "sync_code_signing", "type:appstore", "readonly:true"])
        .arg(format!(
            "app_identifier:{}",
            project.manifest.ios_bundle_identifier()?
        ))
        .arg(format!("api_key_path:{}", api_key.path.display()))
        .env("MATCH_PASSWORD", automated.passphrase.expose())
        .env("MATCH_GIT_PRIVATE_KEY", automated.deploy_key.expose())
        .env("FASTLANE_SKIP_UPDATE_CHECK", "1");
        if let Some(url) = &automated.git_url {
            invocation = invocation.arg(format!("git_url:{url}"));
        }
        if let Some(team) = &automated.team_id {
            invocation = invocation.arg(format!("team_id:{team}"));
        }
        if let Some(apple_id) = &automated.apple_id {
            invocation = invocation.arg(format!("username:{apple_id}"));
        }

        self.runner.run(&invocation).await?.check(&invocation)?;
        log::info!("✓ Code signing synchronized ({})", credentials.signing.label());
        Ok(())
    }

    async fn android_signed_build(
        &self,
        gradlew: &Path,
        credentials: &AndroidCredentials,
        keystore: &CredentialFile,
        version: &VersionIdentifier,
    ) -> Result<BuildArtifact> {
        let android_dir = self.context.native_dir();
        let bundle_dir = android_dir.join("app/build/outputs/bundle/release");
        fs::remove_dir_all(&bundle_dir).await?;

        let property = |name: &str| format!("{GRADLE_PROPERTY}{name}");
        let invocation = Invocation::new(Step::SignedBuild, gradlew, &android_dir)
            .args(["bundleRelease", "--no-daemon"])
            .env(
                property("android.injected.signing.store.file"),
                keystore.path.display().to_string(),
            )
            .env(
                property("android.injected.signing.store.password"),
                credentials.keystore_password.expose(),
            )
            .env(
                property("android.injected.signing.key.alias"),
                credentials.key_alias.as_str(),
            )
            .env(
                property("android.injected.signing.key.password"),
                credentials.key_password.expose(),
            )
            .env(property("android.injected.version.code"), version.code.to_string())
            .env(property("android.injected.version.name"), version.name.as_str());

        self.runner.run(&invocation).await?.check(&invocation)?;
        let path = expect_artifact(&invocation, bundle_dir.join("app-release.aab"))?;
        log::info!("✓ Signed bundle {}", path.display());

        Ok(BuildArtifact {
            platform: Platform::Android,
            path,
            version_name: Some(version.name.clone()),
            version_code: Some(version.code),
            signed: true,
        })
    }

    async fn ios_signed_build(
        &self,
        project: &Project,
        credentials: &IosCredentials,
        version: &VersionIdentifier,
    ) -> Result<BuildArtifact> {
        let root = &self.context.project_root;
        let output_dir = root.join("build").join("ios");
        fs::remove_dir_all(&output_dir).await?;

        let scheme = project.ios_scheme();
        let workspace = self.context.resolve(&project.ios_workspace());

        let mut xcargs = format!(
            "CURRENT_PROJECT_VERSION={} MARKETING_VERSION={}",
            version.code, version.name
        );
        if let SigningMethod::Manual(manual) = &credentials.signing {
            xcargs.push_str(" CODE_SIGN_STYLE=Manual");
            if let Some(team) = &manual.team_id {
                xcargs.push_str(&format!(" DEVELOPMENT_TEAM={team}"));
            }
        }

        let invocation = Invocation::new(Step::SignedBuild, "fastlane", root)
            .args(["run", "build_app"])
            .arg(format!("workspace:{}", workspace.display()))
            .arg(format!("scheme:{scheme}"))
            .args(["configuration:Release", "export_method:app-store"])
            .arg(format!("output_directory:{}", output_dir.display()))
            .arg(format!("output_name:{scheme}.ipa"))
            .arg(format!("xcargs:{xcargs}"))
            .env("FASTLANE_SKIP_UPDATE_CHECK", "1");

        self.runner.run(&invocation).await?.check(&invocation)?;
        let path = expect_artifact(&invocation, output_dir.join(format!("{scheme}.ipa")))?;
        log::info!("✓ Signed archive {}", path.display());

        Ok(BuildArtifact {
            platform: Platform::Ios,
            path,
            version_name: Some(version.name.clone()),
            version_code: Some(version.code),
            signed: true,
        })
    }

    async fn publish(
        &self,
        artifact: &BuildArtifact,
        destination: &Destination<'_>,
    ) -> Result<super::Channel> {
        ArtifactPublisher::new(self.runner, &self.context.project_root)
            .publish(artifact, destination)
            .await
    }
}

/// Create the lane's vault on first use.
fn open_vault<'v>(
    slot: &'v mut Option<CredentialVault>,
    context: &BuildContext,
) -> Result<&'v mut CredentialVault> {
    let vault = match slot.take() {
        Some(vault) => vault,
        None => CredentialVault::create(context)?,
    };
    Ok(slot.insert(vault))
}

/// JavaScript dependency install command, chosen by lockfile.
fn js_install_invocation(root: &Path) -> Invocation {
    let invocation = |program: &str| Invocation::new(Step::InstallDependencies, program, root);
    if root.join("yarn.lock").is_file() {
        invocation("yarn").args(["install", "--frozen-lockfile"])
    } else if root.join("pnpm-lock.yaml").is_file() {
        invocation("pnpm").args(["install", "--frozen-lockfile"])
    } else if root.join("package-lock.json").is_file() {
        invocation("npm").arg("ci")
    } else {
        invocation("npm").arg("install")
    }
}

/// A tool that exits 0 without producing its artifact still failed.
fn expect_artifact(invocation: &Invocation, path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(ReleaseError::Toolchain {
            tool: invocation.tool(),
            status: "exit code 0".to_string(),
            diagnostic: format!("expected artifact not found at {}", path.display()),
        })
    }
}
