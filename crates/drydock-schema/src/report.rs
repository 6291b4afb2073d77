use crate::types::VersionKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("audit report I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit report serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A declaration that a vulnerability is intentionally untracked for the
/// audited suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suppression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One open vulnerability against a source package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// The version that resolves this vulnerability; absent when no fix is
    /// known yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression: Option<Suppression>,
}

/// Audit findings for one source package: the locked binaries built from it
/// and every open vulnerability recorded against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub binaries: BTreeMap<String, VersionKey>,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

/// The persisted audit report (`audit-report.json`), fully regenerated on
/// every audit run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    #[serde(default)]
    pub sources: Vec<SourceReport>,
}

impl AuditReport {
    /// Same temp-then-rename discipline as the lock file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        let dir = path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ReportError::Io(e.error))?;
        if let Ok(f) = fs::File::open(dir) {
            let _ = f.sync_all();
        }
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Total open vulnerabilities across all sources.
    pub fn vulnerability_count(&self) -> usize {
        self.sources.iter().map(|s| s.vulnerabilities.len()).sum()
    }
}
