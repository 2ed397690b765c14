//! Version name and build code resolution.
//!
//! The name always comes from the project manifest. The code is the CI run
//! counter when one is supplied, otherwise 1 for local builds. Nothing here
//! depends on the clock or on randomness, so the same inputs always produce
//! the same identifier.

use super::Platform;
use crate::config::CiContext;
use crate::error::{ReleaseError, Result};
use crate::metadata::ProjectManifest;
use serde::Serialize;
use std::fmt;

/// Build code used when no CI counter is present.
pub const LOCAL_BUILD_CODE: u64 = 1;

/// Largest `versionCode` Google Play accepts.
pub const MAX_ANDROID_VERSION_CODE: u64 = 2_100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionIdentifier {
    /// User-visible version (`versionName` / `CFBundleShortVersionString`).
    pub name: String,
    /// Monotonic counter (`versionCode` / `CFBundleVersion`).
    pub code: u64,
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

pub struct VersionResolver;

impl VersionResolver {
    pub fn resolve(
        manifest: &ProjectManifest,
        ci: &CiContext,
        platform: Platform,
    ) -> Result<VersionIdentifier> {
        let code = match ci.run_number {
            Some(n) => n,
            None => {
                log::info!("No CI run counter; using local build code {LOCAL_BUILD_CODE}");
                LOCAL_BUILD_CODE
            }
        };

        if platform == Platform::Android && code > MAX_ANDROID_VERSION_CODE {
            return Err(ReleaseError::configuration(
                crate::config::vars::GITHUB_RUN_NUMBER,
                format!("{code} exceeds the maximum Android versionCode {MAX_ANDROID_VERSION_CODE}"),
            ));
        }

        Ok(VersionIdentifier {
            name: manifest.version.clone(),
            code,
        })
    }
}
