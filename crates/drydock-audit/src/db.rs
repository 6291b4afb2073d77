//! Read-only view over the Debian security tracker's SQLite export.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::AuditError;

/// One `package_notes` row: a bug's applicability to a source package,
/// optionally scoped to a suite.
#[derive(Debug, Clone)]
pub struct PackageNote {
    pub bug_name: String,
    pub package: String,
    pub fixed_version: Option<String>,
    pub release: Option<String>,
    pub urgency: Option<String>,
}

/// One `bugs` row.
#[derive(Debug, Clone)]
pub struct BugRecord {
    pub name: String,
    pub description: Option<String>,
}

/// One `nvd_data` row: the external description dataset for a CVE.
#[derive(Debug, Clone)]
pub struct NvdRecord {
    pub description: Option<String>,
    pub severity: Option<String>,
}

/// One `package_notes_nodsa` row: a tracked-but-suppressed annotation.
#[derive(Debug, Clone)]
pub struct NoDsaRecord {
    pub reason: Option<String>,
    pub comment: Option<String>,
}

/// The notes store. Opened read-only; the audit never writes here.
#[derive(Debug)]
pub struct SecurityDb {
    connection: Connection,
}

impl SecurityDb {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if !path.is_file() {
            return Err(AuditError::DatabaseMissing(path.to_owned()));
        }
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { connection })
    }

    /// Every note recorded for a source package, optionally narrowed to one
    /// suite.
    pub fn notes_for_package(
        &self,
        package: &str,
        suite: Option<&str>,
    ) -> Result<Vec<PackageNote>, AuditError> {
        let mut sql = "SELECT bug_name, package, fixed_version, release, urgency \
                       FROM package_notes WHERE package = ?1"
            .to_owned();
        if suite.is_some() {
            sql.push_str(" AND release = ?2");
        }
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = match suite {
            Some(suite) => stmt.query_map(params![package, suite], note_from_row)?,
            None => stmt.query_map(params![package], note_from_row)?,
        };
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The note tying `bug` to `package` within exactly `suite`.
    pub fn note_for_bug_in_suite(
        &self,
        package: &str,
        bug: &str,
        suite: &str,
    ) -> Result<Option<PackageNote>, AuditError> {
        let mut stmt = self.connection.prepare(
            "SELECT bug_name, package, fixed_version, release, urgency \
             FROM package_notes \
             WHERE package = ?1 AND bug_name = ?2 AND release = ?3",
        )?;
        Ok(stmt
            .query_row(params![package, bug, suite], note_from_row)
            .optional()?)
    }

    /// The suite-agnostic note tying `bug` to `package` (empty or null
    /// release column).
    pub fn note_for_bug_any_suite(
        &self,
        package: &str,
        bug: &str,
    ) -> Result<Option<PackageNote>, AuditError> {
        let mut stmt = self.connection.prepare(
            "SELECT bug_name, package, fixed_version, release, urgency \
             FROM package_notes \
             WHERE package = ?1 AND bug_name = ?2 \
             AND (release IS NULL OR release = '')",
        )?;
        Ok(stmt
            .query_row(params![package, bug], note_from_row)
            .optional()?)
    }

    pub fn bug(&self, name: &str) -> Result<Option<BugRecord>, AuditError> {
        let mut stmt = self
            .connection
            .prepare("SELECT name, description FROM bugs WHERE name = ?1")?;
        Ok(stmt
            .query_row(params![name], |row| {
                Ok(BugRecord {
                    name: row.get(0)?,
                    description: row.get(1)?,
                })
            })
            .optional()?)
    }

    pub fn nvd_data(&self, cve_name: &str) -> Result<Option<NvdRecord>, AuditError> {
        let mut stmt = self
            .connection
            .prepare("SELECT cve_desc, severity FROM nvd_data WHERE cve_name = ?1")?;
        Ok(stmt
            .query_row(params![cve_name], |row| {
                Ok(NvdRecord {
                    description: row.get(0)?,
                    severity: row.get(1)?,
                })
            })
            .optional()?)
    }

    /// Cross-reference targets recorded for an advisory identifier.
    pub fn references_for(&self, source: &str) -> Result<Vec<String>, AuditError> {
        let mut stmt = self
            .connection
            .prepare("SELECT target FROM bugs_xref WHERE source = ?1")?;
        let rows = stmt.query_map(params![source], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn no_dsa(
        &self,
        package: &str,
        bug: &str,
        suite: &str,
    ) -> Result<Option<NoDsaRecord>, AuditError> {
        let mut stmt = self.connection.prepare(
            "SELECT reason, comment FROM package_notes_nodsa \
             WHERE package = ?1 AND bug_name = ?2 AND release = ?3",
        )?;
        Ok(stmt
            .query_row(params![package, bug, suite], |row| {
                Ok(NoDsaRecord {
                    reason: row.get(0)?,
                    comment: row.get(1)?,
                })
            })
            .optional()?)
    }

    /// Free-text comments recorded against a bug.
    pub fn bug_notes(&self, bug: &str) -> Result<Vec<String>, AuditError> {
        let mut stmt = self
            .connection
            .prepare("SELECT comment FROM bugs_notes WHERE bug_name = ?1")?;
        let rows = stmt.query_map(params![bug], |row| row.get::<_, Option<String>>(0))?;
        let comments = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(comments.into_iter().flatten().collect())
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<PackageNote> {
    Ok(PackageNote {
        bug_name: row.get(0)?,
        package: row.get(1)?,
        fixed_version: row.get(2)?,
        release: row.get(3)?,
        urgency: row.get(4)?,
    })
}
