//! Ephemeral credential files.
//!
//! A [`CredentialVault`] owns one private directory per lane invocation. Secrets
//! decoded for the native toolchain are written inside it and the whole
//! directory is removed when the lane exits, through [`CredentialVault::close`]
//! on the normal paths and through `Drop` if the lane unwinds.
//!
//! # Binary fidelity
//!
//! Keystores are DER/PKCS#12 blobs. They are base64-decoded into memory first
//! and written with a single `write_all` on a file opened in binary mode, so no
//! byte (including `0x0A` and `0x0D`) is ever translated. A blob that fails to
//! decode never creates a file.

use super::BuildContext;
use crate::config::vars::{ANDROID_KEYSTORE_BASE64, ANDROID_KEYSTORE_PATH};
use crate::config::{ApiKeyCredentials, KeystoreSource};
use crate::error::{ErrorExt, ReleaseError, Result};
use base64::Engine;
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Lifetime of an App Store Connect token minted from the key, in seconds.
const API_KEY_TOKEN_DURATION: u32 = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    Keystore,
    ApiKey,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keystore => "keystore",
            Self::ApiKey => "App Store Connect API key",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceEncoding {
    Base64,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposal {
    /// Created by this lane, removed at lane exit.
    DeleteOnExit,
    /// Supplied by the operator, referenced in place and left alone.
    Retain,
}

/// A credential file handed to the native toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialFile {
    pub kind: CredentialKind,
    pub encoding: SourceEncoding,
    pub path: PathBuf,
    pub disposal: Disposal,
}

/// The JSON structure fastlane reads through `api_key_path`.
#[derive(Serialize)]
struct ApiKeyDocument<'a> {
    key_id: &'a str,
    issuer_id: &'a str,
    key: String,
    duration: u32,
    in_house: bool,
}

/// Per-lane owner of every ephemeral credential file.
pub struct CredentialVault {
    dir: Option<TempDir>,
    files: Vec<CredentialFile>,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("dir", &self.dir.as_ref().map(|d| d.path().to_path_buf()))
            .field("files", &self.files.len())
            .finish()
    }
}

impl CredentialVault {
    /// Create the lane's private credential directory under `context.ephemeral_root`.
    ///
    /// The directory name carries the platform and lane id, plus a random
    /// suffix, so concurrent lanes on one host never share a path.
    pub fn create(context: &BuildContext) -> Result<Self> {
        std::fs::create_dir_all(&context.ephemeral_root)
            .fs_context("creating ephemeral root", &context.ephemeral_root)?;

        let prefix = format!("release-{}-{}-", context.platform, context.lane_id.simple());
        let dir = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(&context.ephemeral_root)
            .fs_context("creating credential directory in", &context.ephemeral_root)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))
                .fs_context("restricting permissions on", dir.path())?;
        }

        log::debug!("Created credential directory {}", dir.path().display());
        Ok(Self {
            dir: Some(dir),
            files: Vec::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Files this vault created and will delete.
    pub fn files(&self) -> &[CredentialFile] {
        &self.files
    }

    /// Produce the keystore file the Gradle signing config points at.
    ///
    /// An explicit path is referenced directly; an encoded blob is decoded
    /// into the vault.
    pub fn materialize_keystore(
        &mut self,
        source: &KeystoreSource,
        context: &BuildContext,
    ) -> Result<CredentialFile> {
        match source {
            KeystoreSource::Path(path) => {
                let resolved = context.resolve(path);
                if !resolved.is_file() {
                    return Err(ReleaseError::configuration(
                        ANDROID_KEYSTORE_PATH,
                        format!("no keystore file at {}", resolved.display()),
                    ));
                }
                log::info!("Using keystore at {}", resolved.display());
                Ok(CredentialFile {
                    kind: CredentialKind::Keystore,
                    encoding: SourceEncoding::Raw,
                    path: resolved,
                    disposal: Disposal::Retain,
                })
            }
            KeystoreSource::Encoded(blob) => {
                let bytes = decode_base64(blob.expose()).map_err(|reason| {
                    ReleaseError::CredentialDecode {
                        kind: CredentialKind::Keystore,
                        variable: ANDROID_KEYSTORE_BASE64.to_string(),
                        reason,
                    }
                })?;
                let path = self.write_secret("upload.keystore", &bytes)?;
                log::info!("Decoded keystore ({} bytes) into credential directory", bytes.len());
                Ok(self.track(CredentialKind::Keystore, SourceEncoding::Base64, path))
            }
        }
    }

    /// Assemble the App Store Connect API key JSON file.
    pub fn materialize_api_key(&mut self, key: &ApiKeyCredentials) -> Result<CredentialFile> {
        let document = ApiKeyDocument {
            key_id: &key.key_id,
            issuer_id: &key.issuer_id,
            key: normalize_private_key(key.private_key.expose()),
            duration: API_KEY_TOKEN_DURATION,
            in_house: false,
        };
        let json = serde_json::to_vec_pretty(&document)?;
        let path = self.write_secret(&format!("api-key-{}.json", key.key_id), &json)?;
        log::info!("Assembled App Store Connect API key {}", key.key_id);
        Ok(self.track(CredentialKind::ApiKey, SourceEncoding::Raw, path))
    }

    fn track(&mut self, kind: CredentialKind, encoding: SourceEncoding, path: PathBuf) -> CredentialFile {
        let file = CredentialFile {
            kind,
            encoding,
            path,
            disposal: Disposal::DeleteOnExit,
        };
        self.files.push(file.clone());
        file
    }

    /// Write `bytes` to a new owner-only file inside the vault.
    ///
    /// A failed write removes whatever was partially written.
    fn write_secret(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.path().ok_or_else(|| {
            ReleaseError::Io(std::io::Error::other("credential vault already closed"))
        })?;
        let path = dir.join(file_name);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path).fs_context("creating", &path)?;
        let written = file.write_all(bytes).and_then(|_| file.sync_all());
        drop(file);

        if let Err(e) = written {
            let _ = std::fs::remove_file(&path);
            return Err(ReleaseError::Filesystem {
                action: "writing",
                path,
                source: e,
            });
        }
        Ok(path)
    }

    /// Remove the credential directory and everything in it.
    pub fn close(mut self) -> Result<()> {
        self.files.clear();
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().fs_context("removing credential directory", &path)?;
                log::debug!("Removed credential directory {}", path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for CredentialVault {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                log::error!(
                    "Failed to remove credential directory {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}

/// Decode a base64 secret, tolerating the line wrapping CI secret stores add.
pub fn decode_base64(encoded: &str) -> std::result::Result<Vec<u8>, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err("value is empty".to_string());
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("not valid base64: {e}"))
}

/// Turn literal `\n` escapes (common when a .p8 is pasted into a CI secret) into newlines.
fn normalize_private_key(key: &str) -> String {
    let key = key.trim();
    if key.contains("\\n") && !key.contains('\n') {
        key.replace("\\n", "\n")
    } else {
        key.to_string()
    }
}
