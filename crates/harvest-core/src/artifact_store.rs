//! Session artifact persistence.
//!
//! The artifact is written to a sibling temp file, synced, and renamed over
//! the target, so readers see either the previous file or the complete new
//! one.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use harvest_browser::CookieInfo;
use harvest_types::{SessionArtifact, StoredCookie};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("session artifact {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on session artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owns the artifact file path.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no artifact exists. Empty and malformed files are
    /// [`ArtifactError::Corrupt`].
    pub fn load(&self) -> Result<Option<SessionArtifact>, ArtifactError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ArtifactError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        SessionArtifact::from_json(&text)
            .map(Some)
            .map_err(|e| ArtifactError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Replace the stored artifact, creating parent directories as needed.
    pub fn save(&self, artifact: &SessionArtifact) -> Result<(), ArtifactError> {
        let json = artifact.to_json_pretty()?;
        write_atomic(&self.path, json.as_bytes()).map_err(|source| ArtifactError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Write `contents` to `path` via `<path>.tmp` and a rename. On failure the
/// previous file, if any, is untouched.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = tmp_path_for(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("artifact"));
    name.push(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Cookie conversion
// ---------------------------------------------------------------------------

pub fn stored_from_cookie(cookie: &CookieInfo) -> StoredCookie {
    StoredCookie {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires: cookie.expires.unwrap_or(-1.0),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site: cookie.same_site.clone(),
    }
}

pub fn cookie_from_stored(cookie: &StoredCookie) -> CookieInfo {
    CookieInfo {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        expires: Some(cookie.expires).filter(|e| *e >= 0.0),
        http_only: cookie.http_only,
        secure: cookie.secure,
        same_site: cookie.same_site.clone(),
    }
}
