//! External tool detection.
//!
//! Lanes shell out to fastlane, npx, CocoaPods and xcodebuild. Lookups are
//! cached for the life of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};

/// Tools the pre-flight `--check-tools` option looks for.
pub const LANE_TOOLS: &[(&str, &str)] = &[
    ("fastlane", "store uploads and iOS signing"),
    ("npx", "native project generation"),
    ("pod", "iOS dependency installation"),
    ("xcodebuild", "iOS builds"),
];

static LOCATED: LazyLock<Mutex<HashMap<PathBuf, Option<PathBuf>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Find `program` on PATH.
pub fn locate(program: &Path) -> Option<PathBuf> {
    if let Ok(cache) = LOCATED.lock() {
        if let Some(hit) = cache.get(program) {
            return hit.clone();
        }
    }

    let found = match which::which(program) {
        Ok(path) => {
            log::debug!("Found {} at: {}", program.display(), path.display());
            Some(path)
        }
        Err(e) => {
            log::debug!("{} not found in PATH: {}", program.display(), e);
            None
        }
    };

    if let Ok(mut cache) = LOCATED.lock() {
        cache.insert(program.to_path_buf(), found.clone());
    }
    found
}

/// Tools from [`LANE_TOOLS`] that are not on PATH, with what they are needed for.
pub fn missing_tools() -> Vec<(&'static str, &'static str)> {
    LANE_TOOLS
        .iter()
        .copied()
        .filter(|(tool, _)| locate(Path::new(tool)).is_none())
        .collect()
}
