//! Upload of signed artifacts to their distribution channel.
//!
//! Android bundles go to a non-production Play track as a draft release.
//! iOS archives go to TestFlight without submitting for external review.
//! Both paths go through fastlane actions. Upload failures are returned
//! verbatim; retrying is the caller's decision.

use super::toolchain::{CommandRunner, Invocation};
use super::{BuildArtifact, Channel, Platform, Step};
use crate::config::{PlayTrack, Secret};
use crate::error::{PublishRejection, ReleaseError, Result};
use std::path::Path;

/// Where a signed artifact should go.
#[derive(Debug, Clone)]
pub enum Destination<'a> {
    PlayStore {
        package_name: &'a str,
        service_account: &'a Secret,
        track: PlayTrack,
    },
    TestFlight {
        api_key_path: &'a Path,
        team_id: Option<&'a str>,
    },
}

impl Destination<'_> {
    fn platform(&self) -> Platform {
        match self {
            Self::PlayStore { .. } => Platform::Android,
            Self::TestFlight { .. } => Platform::Ios,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::PlayStore { track, .. } => format!("Google Play ({} track)", track.as_str()),
            Self::TestFlight { .. } => "TestFlight".to_string(),
        }
    }
}

pub struct ArtifactPublisher<'a, R> {
    runner: &'a R,
    project_root: &'a Path,
}

impl<'a, R: CommandRunner> ArtifactPublisher<'a, R> {
    pub fn new(runner: &'a R, project_root: &'a Path) -> Self {
        Self {
            runner,
            project_root,
        }
    }

    /// Upload `artifact` and return the channel it landed in.
    ///
    /// # Errors
    ///
    /// [`ReleaseError::Publish`] when the artifact is unsigned, does not match
    /// the destination, or the service rejects the upload.
    pub async fn publish(&self, artifact: &BuildArtifact, destination: &Destination<'_>) -> Result<Channel> {
        let channel_label = destination.label();
        let refuse = |rejection, diagnostic: String| ReleaseError::Publish {
            channel: channel_label.clone(),
            rejection,
            diagnostic,
        };

        if !artifact.signed {
            return Err(refuse(
                PublishRejection::UnsignedArtifact,
                format!("{} was not produced by a signed build", artifact.path.display()),
            ));
        }
        if artifact.platform != destination.platform() {
            return Err(refuse(
                PublishRejection::Other,
                format!("{} artifact cannot be uploaded to {}", artifact.platform, channel_label),
            ));
        }
        if !artifact.path.is_file() {
            return Err(refuse(
                PublishRejection::Other,
                format!("artifact missing at {}", artifact.path.display()),
            ));
        }

        let (invocation, channel) = self.upload_invocation(artifact, destination);
        log::info!("Uploading {} to {}", artifact.path.display(), channel_label);

        let output = self.runner.run(&invocation).await?;
        if !output.success {
            let diagnostic = output.diagnostic();
            return Err(refuse(classify_rejection(&diagnostic), diagnostic));
        }

        log::info!("✓ Uploaded to {}", channel_label);
        Ok(channel)
    }

    fn upload_invocation(&self, artifact: &BuildArtifact, destination: &Destination<'_>) -> (Invocation, Channel) {
        let artifact_path = artifact.path.display().to_string();
        match destination {
            Destination::PlayStore {
                package_name,
                service_account,
                track,
            } => (
                Invocation::new(Step::Upload, "fastlane", self.project_root)
                    .args(["run", "upload_to_play_store"])
                    .arg(format!("package_name:{package_name}"))
                    .arg(format!("aab:{artifact_path}"))
                    .arg(format!("track:{}", track.as_str()))
                    .args([
                        "release_status:draft",
                        "skip_upload_metadata:true",
                        "skip_upload_changelogs:true",
                        "skip_upload_images:true",
                        "skip_upload_screenshots:true",
                    ])
                    .env("SUPPLY_JSON_KEY_DATA", service_account.expose())
                    .env("FASTLANE_SKIP_UPDATE_CHECK", "1"),
                Channel::Draft,
            ),
            Destination::TestFlight {
                api_key_path,
                team_id,
            } => {
                let mut invocation = Invocation::new(Step::Upload, "fastlane", self.project_root)
                    .args(["run", "upload_to_testflight"])
                    .arg(format!("ipa:{artifact_path}"))
                    .arg(format!("api_key_path:{}", api_key_path.display()))
                    .args([
                        "skip_submission:true",
                        "distribute_external:false",
                        "skip_waiting_for_build_processing:true",
                    ])
                    .env("FASTLANE_SKIP_UPDATE_CHECK", "1");
                if let Some(team) = team_id {
                    invocation = invocation.arg(format!("team_id:{team}"));
                }
                (invocation, Channel::Beta)
            }
        }
    }
}

/// Read the service's diagnostic for the common rejection causes.
pub fn classify_rejection(diagnostic: &str) -> PublishRejection {
    let text = diagnostic.to_ascii_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(&[
        "has already been used",
        "already been uploaded",
        "bundle version must be higher",
        "duplicate",
    ]) {
        PublishRejection::DuplicateVersion
    } else if any(&[
        "401",
        "unauthorized",
        "invalid_grant",
        "authentication credentials are missing or invalid",
        "not authorized",
    ]) {
        PublishRejection::Authentication
    } else if any(&[
        "package not found",
        "no application was found",
        "could not find app",
        "couldn't find app",
    ]) {
        PublishRejection::UnknownApplication
    } else {
        PublishRejection::Other
    }
}
