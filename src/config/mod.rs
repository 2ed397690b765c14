//! Lane configuration.
//!
//! The process environment is read exactly once, into an [`EnvSnapshot`], when
//! the binary starts. Everything downstream works from that snapshot or from
//! the immutable [`LaneConfig`] the environment validator builds out of it.
//!
//! Non-secret settings that belong to the project rather than the machine
//! live in an optional `release.toml` at the project root:
//!
//! ```toml
//! [android]
//! track = "internal"        # internal | alpha | beta
//!
//! [ios]
//! scheme = "Demo"
//! workspace = "ios/Demo.xcworkspace"
//! ```

pub mod vars;

use crate::error::{ErrorExt, ReleaseError, Result};
use crate::lane::Lane;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the optional lane settings file.
pub const SETTINGS_FILE: &str = "release.toml";

/// Immutable copy of the environment variables visible to a lane.
#[derive(Clone, Default)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        std::env::vars().collect()
    }

    /// Value of `name`, treating empty or whitespace-only values as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSnapshot")
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A secret value. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Where the Android upload keystore comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeystoreSource {
    /// Existing keystore file, referenced in place.
    Path(PathBuf),
    /// Base64-encoded keystore bytes, decoded into the credential vault.
    Encoded(Secret),
}

#[derive(Debug, Clone)]
pub struct AndroidCredentials {
    pub keystore: KeystoreSource,
    pub keystore_password: Secret,
    pub key_alias: String,
    pub key_password: Secret,
    /// Raw service-account JSON for the Play Developer API.
    pub service_account_json: Secret,
}

/// App Store Connect API key material.
#[derive(Debug, Clone)]
pub struct ApiKeyCredentials {
    pub key_id: String,
    pub issuer_id: String,
    pub private_key: Secret,
}

/// Centralized certificate management through a shared match repository.
#[derive(Debug, Clone)]
pub struct AutomatedSigning {
    pub deploy_key: Secret,
    pub passphrase: Secret,
    pub git_url: Option<String>,
    pub team_id: Option<String>,
    pub apple_id: Option<String>,
}

/// Provisioning profiles already installed on the build machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualSigning {
    pub team_id: Option<String>,
    pub itc_team_id: Option<String>,
}

/// Decided once by the environment validator.
#[derive(Debug, Clone)]
pub enum SigningMethod {
    Automated(AutomatedSigning),
    Manual(ManualSigning),
}

impl SigningMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Automated(_) => "automated (match)",
            Self::Manual(_) => "manual profiles",
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            Self::Automated(a) => a.team_id.as_deref(),
            Self::Manual(m) => m.team_id.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IosCredentials {
    pub api_key: ApiKeyCredentials,
    pub signing: SigningMethod,
}

#[derive(Debug, Clone)]
pub enum ReleaseCredentials {
    Android(AndroidCredentials),
    Ios(IosCredentials),
}

/// What the invoking automation tells us about itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CiContext {
    pub is_ci: bool,
    /// Monotonic run counter supplied by CI.
    pub run_number: Option<u64>,
}

/// Validated configuration for one lane invocation.
#[derive(Debug, Clone)]
pub struct LaneConfig {
    pub lane: Lane,
    pub ci: CiContext,
    /// Present for release lanes only.
    pub credentials: Option<ReleaseCredentials>,
}

impl LaneConfig {
    pub fn android(&self) -> Result<&AndroidCredentials> {
        match &self.credentials {
            Some(ReleaseCredentials::Android(c)) => Ok(c),
            _ => Err(ReleaseError::configuration(
                "credentials",
                "Android release credentials were not validated for this lane",
            )),
        }
    }

    pub fn ios(&self) -> Result<&IosCredentials> {
        match &self.credentials {
            Some(ReleaseCredentials::Ios(c)) => Ok(c),
            _ => Err(ReleaseError::configuration(
                "credentials",
                "iOS release credentials were not validated for this lane",
            )),
        }
    }
}

/// Play Console tracks a lane may upload to. Production is deliberately absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayTrack {
    #[default]
    Internal,
    Alpha,
    Beta,
}

impl PlayTrack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AndroidSettings {
    #[serde(default)]
    pub track: PlayTrack,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IosSettings {
    /// Xcode scheme. Defaults to the manifest name stripped to alphanumerics.
    #[serde(default)]
    pub scheme: Option<String>,
    /// Workspace path relative to the project root.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

/// Contents of `release.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaneSettings {
    #[serde(default)]
    pub android: AndroidSettings,
    #[serde(default)]
    pub ios: IosSettings,
}

impl LaneSettings {
    /// Load `release.toml` from the project root, or defaults when absent.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(SETTINGS_FILE);
        if !path.exists() {
            log::debug!("No {} found, using default lane settings", SETTINGS_FILE);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).fs_context("reading", &path)?;
        Self::parse(&text).map_err(|e| ReleaseError::Manifest {
            path,
            reason: e.to_string(),
        })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
