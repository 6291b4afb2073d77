//! The audit walk: lock entries in, per-source vulnerability findings out.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::{debug, info};

use drydock_apt::Dpkg;
use drydock_schema::{
    AuditReport, ImageLock, SourceReport, Suppression, VersionKey, Vulnerability,
};

use crate::db::SecurityDb;
use crate::AuditError;

/// Bug identifier prefixes that mark formal advisories; only these carry
/// cross-reference entries worth attaching.
const ADVISORY_PREFIXES: [&str; 2] = ["DSA-", "DLA-"];

pub struct AuditEngine {
    db: SecurityDb,
    dpkg: Dpkg,
    suite: String,
    machine_note: Regex,
}

impl AuditEngine {
    pub fn new(db: SecurityDb, dpkg: Dpkg, suite: impl Into<String>) -> Self {
        Self {
            db,
            dpkg,
            suite: suite.into(),
            // Tracker annotations like "[buster] - curl <no-dsa> (Minor issue)"
            // are machine state, not prose.
            machine_note: Regex::new(r"^\[[^\]]+\]\s*-\s*\S+").unwrap(),
        }
    }

    /// Audit every source package represented in the lock.
    ///
    /// The version-ordering probe runs first; a comparator that cannot tell
    /// 1 from 2 would otherwise turn the whole report into noise.
    pub fn run(&self, lock: &ImageLock) -> Result<AuditReport, AuditError> {
        self.dpkg.verify_ordering()?;

        let mut sources: BTreeMap<(String, String), BTreeMap<String, VersionKey>> =
            BTreeMap::new();
        for (binary, entry) in &lock.installed_packages {
            sources
                .entry((entry.source.name.clone(), entry.source.version.clone()))
                .or_default()
                .insert(binary.clone(), entry.version.clone());
        }

        info!(
            "auditing {} source packages against suite {}",
            sources.len(),
            self.suite
        );

        let mut report = AuditReport::default();
        for ((name, version), binaries) in sources {
            let vulnerabilities = self.audit_source(&name, &version)?;
            if !vulnerabilities.is_empty() {
                debug!(
                    "{name} {version}: {} open vulnerabilities",
                    vulnerabilities.len()
                );
            }
            report.sources.push(SourceReport {
                name,
                version,
                binaries,
                vulnerabilities,
            });
        }
        Ok(report)
    }

    fn audit_source(
        &self,
        source: &str,
        source_version: &str,
    ) -> Result<Vec<Vulnerability>, AuditError> {
        let mut bugs = BTreeSet::new();
        for note in self.db.notes_for_package(source, None)? {
            bugs.insert(note.bug_name);
        }

        let mut vulnerabilities = Vec::new();
        for bug in &bugs {
            if let Some(found) = self.evaluate_bug(source, source_version, bug)? {
                vulnerabilities.push(found);
            }
        }
        Ok(vulnerabilities)
    }

    /// Decide whether `bug` is open for the pinned source version, and build
    /// the report entry when it is.
    fn evaluate_bug(
        &self,
        source: &str,
        source_version: &str,
        bug: &str,
    ) -> Result<Option<Vulnerability>, AuditError> {
        // Suite-specific note wins; the suite-agnostic note is the fallback.
        let note = match self.db.note_for_bug_in_suite(source, bug, &self.suite)? {
            Some(note) => note,
            None => match self.db.note_for_bug_any_suite(source, bug)? {
                Some(note) => note,
                None => return Ok(None),
            },
        };

        let fixed = note.fixed_version.as_deref().unwrap_or("").trim();
        if fixed == "0" {
            // Tracker sentinel: this source was never affected.
            return Ok(None);
        }
        let fixed_version = if fixed.is_empty() {
            // Affected with no fix available yet; always reported.
            None
        } else if self.dpkg.version_lt(source_version, fixed)? {
            Some(fixed.to_owned())
        } else {
            return Ok(None);
        };

        Ok(Some(self.describe(source, bug, fixed_version)?))
    }

    fn describe(
        &self,
        source: &str,
        bug: &str,
        fixed_version: Option<String>,
    ) -> Result<Vulnerability, AuditError> {
        let local = self.db.bug(bug)?;
        let nvd = self.db.nvd_data(bug)?;

        let description = nvd
            .as_ref()
            .and_then(|record| record.description.clone())
            .filter(|text| !text.is_empty())
            .or_else(|| {
                local
                    .and_then(|record| record.description)
                    .filter(|text| !text.is_empty())
            });
        let severity = nvd
            .and_then(|record| record.severity)
            .filter(|text| !text.is_empty());

        let references = if ADVISORY_PREFIXES
            .iter()
            .any(|prefix| bug.starts_with(prefix))
        {
            self.db.references_for(bug)?
        } else {
            Vec::new()
        };

        let suppression = self.db.no_dsa(source, bug, &self.suite)?.map(|record| {
            Suppression {
                reason: record.reason,
                comment: record.comment,
            }
        });

        let notes = self
            .db
            .bug_notes(bug)?
            .into_iter()
            .filter(|note| !note.trim().is_empty())
            .filter(|note| !self.machine_note.is_match(note))
            .collect();

        Ok(Vulnerability {
            name: bug.to_owned(),
            description,
            severity,
            fixed_version,
            references,
            notes,
            suppression,
        })
    }
}
