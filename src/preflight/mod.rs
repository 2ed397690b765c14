//! Read-only project consistency checks, run before any lane.
//!
//! [`ProjectSnapshot::capture`] is the only part that touches the
//! filesystem. [`validate`] is a pure function over the snapshot, so the
//! whole rule set is testable without a real project on disk.

use crate::error::{ErrorExt, Result};
use crate::metadata::{self, MANIFEST_FILE, ProjectManifest};
use crate::validation::ValidationReport;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Files every project must carry.
pub const REQUIRED_FILES: &[&str] = &[
    "package.json",
    MANIFEST_FILE,
    "fastlane/Fastfile",
    "fastlane/Appfile",
];

const GRADLEW: &str = "android/gradlew";
const GRADLE_BUILD_FILES: &[&str] = &["android/app/build.gradle", "android/app/build.gradle.kts"];
const APPFILE: &str = "fastlane/Appfile";

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "Pods",
    "build",
    ".gradle",
    ".expo",
    ".release",
];

/// Extensions of signing material that should never live in the tree.
const SECRET_EXTENSIONS: &[&str] = &["jks", "keystore", "p8", "p12"];

/// The Android debug keystore is generated by prebuild and is not a secret.
const DEBUG_KEYSTORE: &str = "debug.keystore";

static PBXPROJ: LazyLock<Option<glob::Pattern>> =
    LazyLock::new(|| glob::Pattern::new("ios/*.xcodeproj/project.pbxproj").ok());

/// One file in the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    pub executable: bool,
    /// Loaded only for the descriptors the checks read.
    pub contents: Option<String>,
}

/// Relative paths of the project tree, with the contents of the files the
/// checks need.
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    files: BTreeMap<PathBuf, FileEntry>,
}

impl ProjectSnapshot {
    /// Walk `root` and record every file outside the skipped directories.
    pub fn capture(root: &Path) -> Result<Self> {
        let mut snapshot = Self::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let contents = if wants_contents(&relative) {
                Some(std::fs::read_to_string(entry.path()).fs_context("reading", entry.path())?)
            } else {
                None
            };
            snapshot.files.insert(
                relative,
                FileEntry {
                    executable: crate::utils::fs::is_executable(entry.path()),
                    contents,
                },
            );
        }

        log::debug!("Captured {} files from {}", snapshot.files.len(), root.display());
        Ok(snapshot)
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, entry: FileEntry) {
        self.files.insert(path.into(), entry);
    }

    /// Add a text file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(
            path,
            FileEntry {
                executable: false,
                contents: Some(contents.into()),
            },
        );
        self
    }

    /// Add a file by name only.
    pub fn with_entry(mut self, path: impl Into<PathBuf>, executable: bool) -> Self {
        self.insert(
            path,
            FileEntry {
                executable,
                contents: None,
            },
        );
        self
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FileEntry> {
        self.files.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.files.contains_key(path.as_ref())
    }

    fn contents(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.get(path).and_then(|e| e.contents.as_deref())
    }

    fn has_dir(&self, dir: &str) -> bool {
        self.files.keys().any(|p| p.starts_with(dir))
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }
}

fn wants_contents(relative: &Path) -> bool {
    let matches_pbxproj = PBXPROJ.as_ref().is_some_and(|p| p.matches_path(relative));
    matches_pbxproj
        || relative == Path::new(MANIFEST_FILE)
        || relative == Path::new(APPFILE)
        || GRADLE_BUILD_FILES.iter().any(|f| relative == Path::new(f))
}

/// Run every check over `snapshot`.
pub fn validate(snapshot: &ProjectSnapshot) -> ValidationReport {
    let mut report = ValidationReport::new();

    for file in REQUIRED_FILES {
        if !snapshot.contains(file) {
            report.error(*file, "required file is missing");
        }
    }

    check_gradlew(snapshot, &mut report);

    let manifest = snapshot
        .contents(MANIFEST_FILE)
        .map(|text| ProjectManifest::parse(text, Path::new(MANIFEST_FILE)));
    match manifest {
        Some(Ok(manifest)) => {
            check_version(&manifest, &mut report);
            check_android_identifiers(snapshot, &manifest, &mut report);
            check_ios_identifiers(snapshot, &manifest, &mut report);
        }
        Some(Err(e)) => report.error(MANIFEST_FILE, e.to_string()),
        None => {}
    }

    check_secret_files(snapshot, &mut report);
    report
}

fn check_gradlew(snapshot: &ProjectSnapshot, report: &mut ValidationReport) {
    if !snapshot.has_dir("android") {
        report.warning(
            "android",
            "native project not generated yet; the build lane runs prebuild first",
        );
        return;
    }
    match snapshot.get(GRADLEW) {
        None => report.error(GRADLEW, "required file is missing"),
        Some(entry) if !entry.executable => report.warning(
            GRADLEW,
            "is not executable; release lanes add the permission, run `chmod +x android/gradlew` to fix it in the repository",
        ),
        Some(_) => {}
    }
}

fn check_version(manifest: &ProjectManifest, report: &mut ValidationReport) {
    if let Err(e) = semver::Version::parse(&manifest.version) {
        report.error(
            "expo.version",
            format!("{:?} is not a semantic version ({e})", manifest.version),
        );
    }
}

fn check_android_identifiers(
    snapshot: &ProjectSnapshot,
    manifest: &ProjectManifest,
    report: &mut ValidationReport,
) {
    let Some(expected) = manifest.android_package.as_deref() else {
        report.warning("expo.android.package", "is not set; Android release lanes will fail");
        return;
    };

    for file in GRADLE_BUILD_FILES {
        let Some(text) = snapshot.contents(file) else {
            continue;
        };
        match metadata::gradle_application_id(text) {
            Some(found) if found != expected => report.error(
                *file,
                format!("applicationId {found:?} does not match {MANIFEST_FILE} package {expected:?}"),
            ),
            Some(_) => {}
            None => report.warning(*file, "no applicationId found"),
        }
    }

    if let Some(found) = snapshot
        .contents(APPFILE)
        .and_then(|text| metadata::appfile_identifiers(text).package_name)
    {
        if found != expected {
            report.error(
                APPFILE,
                format!("package_name {found:?} does not match {MANIFEST_FILE} package {expected:?}"),
            );
        }
    }
}

fn check_ios_identifiers(
    snapshot: &ProjectSnapshot,
    manifest: &ProjectManifest,
    report: &mut ValidationReport,
) {
    let Some(expected) = manifest.ios_bundle_identifier.as_deref() else {
        report.warning("expo.ios.bundleIdentifier", "is not set; iOS release lanes will fail");
        return;
    };

    let pbxprojs: Vec<&Path> = snapshot
        .paths()
        .filter(|p| PBXPROJ.as_ref().is_some_and(|pattern| pattern.matches_path(p)))
        .collect();
    for path in pbxprojs {
        let Some(text) = snapshot.contents(path) else {
            continue;
        };
        let ids = metadata::pbxproj_bundle_identifiers(text);
        if !ids.iter().any(|id| id == expected) {
            report.error(
                path.display().to_string(),
                format!(
                    "no PRODUCT_BUNDLE_IDENTIFIER matches {MANIFEST_FILE} bundleIdentifier {expected:?} (found: {})",
                    if ids.is_empty() { "none".to_string() } else { ids.join(", ") }
                ),
            );
        }
    }

    if let Some(found) = snapshot
        .contents(APPFILE)
        .and_then(|text| metadata::appfile_identifiers(text).app_identifier)
    {
        if found != expected {
            report.error(
                APPFILE,
                format!("app_identifier {found:?} does not match {MANIFEST_FILE} bundleIdentifier {expected:?}"),
            );
        }
    }
}

fn check_secret_files(snapshot: &ProjectSnapshot, report: &mut ValidationReport) {
    for path in snapshot.paths() {
        let is_secret = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SECRET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        let is_debug_keystore = path.file_name().is_some_and(|n| n == DEBUG_KEYSTORE);
        if is_secret && !is_debug_keystore {
            report.warning(
                path.display().to_string(),
                "signing material inside the project tree; supply it through the environment instead",
            );
        }
    }
}
