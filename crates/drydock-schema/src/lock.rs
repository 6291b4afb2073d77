use crate::types::VersionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock file parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("lock file not found at {0}; run 'drydock install' first")]
    Missing(PathBuf),
}

/// Source package a locked binary was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSource {
    pub name: String,
    pub version: String,
}

/// One pinned entry of the lock: the resolved (version, architecture) and
/// the originating source package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedPackage {
    pub version: VersionKey,
    pub source: PackageSource,
}

/// The fully resolved, pinned package set of one install run, persisted as
/// `image-lock.json`. The lock is regenerated from scratch on every run,
/// never merged with a previous one; keys serialize in sorted order so an
/// unchanged resolution produces byte-identical output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLock {
    #[serde(default)]
    pub installed_packages: BTreeMap<String, LockedPackage>,
}

impl ImageLock {
    /// Write the lock atomically: serialize to a temporary file in the
    /// destination directory, fsync, rename over the target, then fsync the
    /// directory so the rename survives power loss.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| LockError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LockError::Missing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
