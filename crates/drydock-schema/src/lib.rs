//! Image manifest, version identity, install lock, and audit report models for Drydock.
//!
//! This crate defines the schema layer: the declared image manifest
//! (`Image`, read from `image.json`), the version/architecture identity
//! value (`VersionKey`), the pinned install lock (`ImageLock`, persisted
//! as `image-lock.json`), and the vulnerability audit report
//! (`AuditReport`, persisted as `audit-report.json`).

pub mod lock;
pub mod manifest;
pub mod report;
pub mod types;

pub use lock::{ImageLock, LockError, LockedPackage, PackageSource};
pub use manifest::{parse_image_file, parse_image_str, AptRepo, Image, InstallScript, ManifestError};
pub use report::{AuditReport, ReportError, SourceReport, Suppression, Vulnerability};
pub use types::VersionKey;
