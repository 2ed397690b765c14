//! Project metadata from `app.json` and the native project descriptors.
//!
//! `app.json` is the single source of truth for the application identifiers
//! and the version name. The native descriptors (`build.gradle`,
//! `project.pbxproj`) and the fastlane `Appfile` carry copies of the
//! identifiers that must agree with it; the extractors below are pure so the
//! pre-flight checker can run them over a snapshot.

use crate::config::LaneSettings;
use crate::error::{ErrorExt, ReleaseError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub const MANIFEST_FILE: &str = "app.json";

/// Application metadata extracted from `app.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectManifest {
    /// Display name (`expo.name`)
    pub name: String,

    /// Version name shown to users (`expo.version`, e.g. "1.4.0")
    pub version: String,

    /// Android application id (`expo.android.package`)
    pub android_package: Option<String>,

    /// iOS bundle identifier (`expo.ios.bundleIdentifier`)
    pub ios_bundle_identifier: Option<String>,
}

impl ProjectManifest {
    /// Parse the manifest text. Accepts both the `{"expo": {...}}` form and a bare config.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let invalid = |reason: String| ReleaseError::Manifest {
            path: path.to_path_buf(),
            reason,
        };

        let root: serde_json::Value =
            serde_json::from_str(text).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
        let expo = root.get("expo").unwrap_or(&root);

        let name = expo
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| invalid("missing 'name'".to_string()))?
            .to_string();

        let version = expo
            .get("version")
            .and_then(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| invalid("missing 'version'".to_string()))?
            .to_string();

        let android_package = expo
            .get("android")
            .and_then(|a| a.get("package"))
            .and_then(|v| v.as_str())
            .map(String::from);

        let ios_bundle_identifier = expo
            .get("ios")
            .and_then(|i| i.get("bundleIdentifier"))
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Self {
            name,
            version,
            android_package,
            ios_bundle_identifier,
        })
    }

    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).fs_context("reading", &path)?;
        Self::parse(&text, &path)
    }

    /// Scheme name Expo prebuild derives from the display name.
    pub fn default_scheme(&self) -> String {
        self.name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
    }

    pub fn android_package(&self) -> Result<&str> {
        self.android_package.as_deref().ok_or_else(|| ReleaseError::Manifest {
            path: PathBuf::from(MANIFEST_FILE),
            reason: "missing 'android.package'".to_string(),
        })
    }

    pub fn ios_bundle_identifier(&self) -> Result<&str> {
        self.ios_bundle_identifier
            .as_deref()
            .ok_or_else(|| ReleaseError::Manifest {
                path: PathBuf::from(MANIFEST_FILE),
                reason: "missing 'ios.bundleIdentifier'".to_string(),
            })
    }
}

/// Manifest plus lane settings, loaded once per lane.
#[derive(Debug, Clone)]
pub struct Project {
    pub manifest: ProjectManifest,
    pub settings: LaneSettings,
}

impl Project {
    pub fn load(project_root: &Path) -> Result<Self> {
        let manifest = ProjectManifest::load(project_root)?;
        let settings = LaneSettings::load(project_root)?;
        log::info!(
            "Loaded {} {} from {}",
            manifest.name,
            manifest.version,
            project_root.join(MANIFEST_FILE).display()
        );
        Ok(Self { manifest, settings })
    }

    pub fn ios_scheme(&self) -> String {
        self.settings
            .ios
            .scheme
            .clone()
            .unwrap_or_else(|| self.manifest.default_scheme())
    }

    /// Workspace path relative to the project root.
    pub fn ios_workspace(&self) -> PathBuf {
        self.settings
            .ios
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from("ios").join(format!("{}.xcworkspace", self.ios_scheme())))
    }
}

static GRADLE_APPLICATION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*applicationId\s*(?:=\s*)?["']([^"']+)["']"#)
        .expect("valid applicationId pattern")
});

static PBXPROJ_BUNDLE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"PRODUCT_BUNDLE_IDENTIFIER\s*=\s*"?([A-Za-z0-9.\-]+)"?\s*;"#)
        .expect("valid PRODUCT_BUNDLE_IDENTIFIER pattern")
});

static APPFILE_APP_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*app_identifier\s*\(?\s*["']([^"']+)["']"#)
        .expect("valid app_identifier pattern")
});

static APPFILE_PACKAGE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*package_name\s*\(?\s*["']([^"']+)["']"#)
        .expect("valid package_name pattern")
});

/// `applicationId` from a Groovy or Kotlin `build.gradle`.
pub fn gradle_application_id(text: &str) -> Option<String> {
    GRADLE_APPLICATION_ID
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Every distinct `PRODUCT_BUNDLE_IDENTIFIER` in a `project.pbxproj`.
pub fn pbxproj_bundle_identifiers(text: &str) -> Vec<String> {
    let mut ids: Vec<String> = PBXPROJ_BUNDLE_ID
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Identifiers declared in a fastlane `Appfile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppfileIdentifiers {
    pub app_identifier: Option<String>,
    pub package_name: Option<String>,
}

pub fn appfile_identifiers(text: &str) -> AppfileIdentifiers {
    AppfileIdentifiers {
        app_identifier: APPFILE_APP_IDENTIFIER
            .captures(text)
            .map(|c| c[1].to_string()),
        package_name: APPFILE_PACKAGE_NAME.captures(text).map(|c| c[1].to_string()),
    }
}
