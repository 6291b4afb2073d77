//! Vulnerability audit of a pinned lock.
//!
//! The lock knows which source package every installed binary came from; the
//! Debian security tracker publishes its bug data as an SQLite database.
//! [`SecurityDb`] is the read-only view over that database and
//! [`AuditEngine`] walks the lock's source packages against it, deciding per
//! bug whether the pinned source version is affected.

pub mod db;
pub mod engine;

pub use db::{BugRecord, NoDsaRecord, NvdRecord, PackageNote, SecurityDb};
pub use engine::AuditEngine;

use std::path::PathBuf;

use thiserror::Error;

use drydock_apt::AptError;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("security database not found at {0}")]
    DatabaseMissing(PathBuf),

    #[error("security database query failed: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Apt(#[from] AptError),
}
