//! Archive extraction and version ordering via `dpkg`.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::exec::{self, ExecContext};
use crate::AptError;

/// Raw transport for `dpkg`; swapped out in tests.
pub trait DpkgSource {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), AptError>;
    /// `dpkg --compare-versions a op b`, answered through the exit status.
    fn compare_versions(&self, a: &str, op: &str, b: &str) -> Result<bool, AptError>;
}

/// Runs the real `dpkg` binary. Extraction goes through the context because
/// root filesystem trees contain root-owned paths; comparisons never touch
/// the filesystem and run unelevated.
pub struct SystemDpkgSource {
    ctx: ExecContext,
}

impl SystemDpkgSource {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

impl DpkgSource for SystemDpkgSource {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), AptError> {
        let mut cmd = self.ctx.root_command("dpkg");
        cmd.arg("-X").arg(archive).arg(dest).env("LC_ALL", "C");
        exec::run(&mut cmd)
    }

    fn compare_versions(&self, a: &str, op: &str, b: &str) -> Result<bool, AptError> {
        let mut cmd = Command::new("dpkg");
        cmd.args(["--compare-versions", a, op, b])
            .env("LC_ALL", "C")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let status = cmd.status()?;
        Ok(status.success())
    }
}

/// The `dpkg` oracle.
pub struct Dpkg {
    source: Box<dyn DpkgSource>,
}

impl Dpkg {
    pub fn new(source: Box<dyn DpkgSource>) -> Self {
        Self { source }
    }

    pub fn system(ctx: &ExecContext) -> Self {
        Self::new(Box::new(SystemDpkgSource::new(ctx.clone())))
    }

    /// Unpack a `.deb` archive's filesystem payload under `dest`.
    pub fn extract(&self, archive: &Path, dest: &Path) -> Result<(), AptError> {
        self.source.extract(archive, dest)
    }

    /// True when `a` sorts strictly before `b` in Debian version order.
    pub fn version_lt(&self, a: &str, b: &str) -> Result<bool, AptError> {
        self.source.compare_versions(a, "lt", b)
    }

    /// Probe the ordering primitive with two comparisons whose answers are
    /// known. The exit status carries the answer, so a broken installation
    /// would otherwise read as a stream of plausible verdicts.
    pub fn verify_ordering(&self) -> Result<(), AptError> {
        if self.version_lt("1", "2")? && !self.version_lt("2", "1")? {
            Ok(())
        } else {
            Err(AptError::OrderingSanity)
        }
    }
}
