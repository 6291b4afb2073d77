//! Workspace orchestration for drydock.
//!
//! A workspace is a directory holding `image.json` (the declared manifest),
//! the pinned `image-lock.json` produced by install planning, the private
//! apt tree, and generated artifacts. This crate ties the schema types and
//! the apt/audit oracles together into the operations the CLI exposes:
//! planning an install, generating a root filesystem, installing scripts,
//! syncing changelogs, and running a vulnerability audit.

pub mod changelogs;
pub mod plan;
pub mod rootfs;
pub mod scripts;
pub mod workspace;

pub use plan::{verify_closure, InstallOptions, Planner};
pub use rootfs::{RootfsBuilder, RootfsOptions};
pub use workspace::{Workspace, WorkspaceLock};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("manifest error: {0}")]
    Manifest(#[from] drydock_schema::ManifestError),

    #[error("lock error: {0}")]
    Lock(#[from] drydock_schema::LockError),

    #[error("report error: {0}")]
    Report(#[from] drydock_schema::ReportError),

    #[error("apt error: {0}")]
    Apt(#[from] drydock_apt::AptError),

    #[error("audit error: {0}")]
    Audit(#[from] drydock_audit::AuditError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workspace {0} is already in use by another drydock process")]
    WorkspaceBusy(PathBuf),

    #[error("the solver confirmed no packages for a non-empty request")]
    EmptySimulation,

    #[error("no catalog record for {package} {version} even though the solver confirmed it")]
    MissingCatalogEntry { package: String, version: String },

    #[error("archive {0} was not downloaded")]
    MissingArchive(PathBuf),

    #[error("preseed file {0} doesn't exist")]
    MissingPreseed(PathBuf),

    #[error("install script {0} doesn't exist")]
    MissingScript(PathBuf),

    #[error("lock entry for {package} is missing its pinned version or architecture; re-run 'drydock install'")]
    IncompleteLockEntry { package: String },

    #[error("no changelog advertised for {package}")]
    ChangelogUnavailable { package: String },

    #[error("directory {0} is not empty (pass --overwrite to replace it)")]
    RootfsNotEmpty(PathBuf),
}
