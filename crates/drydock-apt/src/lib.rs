//! Boundary oracles for the apt toolchain.
//!
//! Everything drydock knows about Debian packages comes from external tools,
//! and every call to those tools goes through this crate: catalog queries via
//! [`AptCache`], index refresh, downloads and install simulation via
//! [`AptGet`], archive extraction and version ordering via [`Dpkg`], and the
//! private apt directory tree via [`AptLayout`]. The pure grammars those
//! tools speak (control blocks, dependency fields, simulation transcripts)
//! are parsed here as plain functions over captured text so they can be
//! tested without a Debian host.

pub mod cache;
pub mod control;
pub mod depend;
pub mod dpkg;
pub mod exec;
pub mod get;
pub mod layout;
pub mod mock;

pub use cache::{AptCache, CacheSource, PackageInfo, PolicyInfo, SystemCacheSource};
pub use control::{blocks, ControlBlock};
pub use depend::{parse_dependency_list, Dependency};
pub use dpkg::{Dpkg, DpkgSource, SystemDpkgSource};
pub use exec::ExecContext;
pub use get::{deb_file_name, AptGet, InstallSource, SystemInstallSource};
pub use layout::AptLayout;

use thiserror::Error;

/// Errors from the apt boundary.
///
/// A failed external command is never retried; the captured output rides
/// along so the operator sees exactly what the tool said.
#[derive(Debug, Error)]
pub enum AptError {
    #[error("apt I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("at least one package name is required")]
    EmptyRequest,

    #[error("at least one repository is required")]
    NoRepositories,

    #[error("command `{command}` failed ({status})\n{output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("malformed {field} field: {value:?}")]
    MalformedField { field: &'static str, value: String },

    #[error("package record for {package:?} is missing the {field} field")]
    MissingField { package: String, field: &'static str },

    #[error("dpkg version ordering failed its sanity probe")]
    OrderingSanity,
}
