//! The workspace directory and the operations that run inside it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::info;

use drydock_apt::{AptGet, AptLayout, Dpkg, ExecContext};
use drydock_audit::{AuditEngine, SecurityDb};
use drydock_schema::{AuditReport, Image, ImageLock};

use crate::plan::{InstallOptions, Planner};
use crate::rootfs::{RootfsBuilder, RootfsOptions};
use crate::{changelogs, scripts, WorkspaceError};

/// Advisory lock guarding a workspace against concurrent drydock runs.
/// Held for the duration of an operation and released on drop. A second
/// process finding the lock held fails immediately rather than waiting.
pub struct WorkspaceLock {
    lock_file: File,
}

impl WorkspaceLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, WorkspaceError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { lock_file: file }),
            Err(_) => Err(WorkspaceError::WorkspaceBusy(lock_path.to_path_buf())),
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// A directory holding `image.json` and everything derived from it.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace rooted at `root`. The directory must already exist;
    /// the apt tree and generated artifacts are created on demand.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref().canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_file(&self) -> PathBuf {
        self.root.join("image.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.root.join("image-lock.json")
    }

    pub fn report_file(&self) -> PathBuf {
        self.root.join("audit-report.json")
    }

    pub fn changelogs_dir(&self) -> PathBuf {
        self.root.join("changelogs")
    }

    /// Where downloaded `.deb` archives land before extraction.
    pub fn archives_dir(&self) -> PathBuf {
        self.root.join(".debs")
    }

    fn guard_file(&self) -> PathBuf {
        self.root.join(".drydock.lock")
    }

    /// Take the single-instance guard for this workspace.
    pub fn guard(&self) -> Result<WorkspaceLock, WorkspaceError> {
        WorkspaceLock::acquire(&self.guard_file())
    }

    pub fn load_image(&self) -> Result<Image, WorkspaceError> {
        Ok(drydock_schema::parse_image_file(self.image_file())?)
    }

    pub fn load_lock(&self) -> Result<ImageLock, WorkspaceError> {
        Ok(ImageLock::read_from_file(self.lock_file())?)
    }

    pub fn apt_layout(&self) -> AptLayout {
        AptLayout::new(&self.root)
    }

    pub fn exec_context(&self) -> ExecContext {
        ExecContext::for_current_user(self.apt_layout().config_file())
    }

    /// Resolve the image manifest into a pinned lock and persist it as
    /// `image-lock.json`. The lock is rebuilt from scratch on every run.
    pub fn install(&self, options: InstallOptions) -> Result<ImageLock, WorkspaceError> {
        let _guard = self.guard()?;
        let image = self.load_image()?;
        self.apt_layout()
            .prepare(&image.repositories, image.exclude_recommends)?;

        let ctx = self.exec_context();
        AptGet::system(&ctx).update()?;

        let lock = Planner::system(&ctx).plan(&image, options)?;
        lock.write_to_file(self.lock_file())?;
        info!(
            "pinned {} packages into {}",
            lock.installed_packages.len(),
            self.lock_file().display()
        );
        Ok(lock)
    }

    /// Materialize the locked package set as a root filesystem.
    pub fn generate_rootfs(&self, options: RootfsOptions) -> Result<PathBuf, WorkspaceError> {
        let _guard = self.guard()?;
        let image = self.load_image()?;
        let lock = self.load_lock()?;
        self.apt_layout()
            .prepare(&image.repositories, image.exclude_recommends)?;

        let ctx = self.exec_context();
        let apt_get = AptGet::system(&ctx);
        let dpkg = Dpkg::system(&ctx);
        RootfsBuilder::new(self, &ctx, &apt_get, &dpkg).generate(&image, &lock, options)
    }

    /// Copy the image's install scripts into a generated rootfs, optionally
    /// running each inside it.
    pub fn generate_scripts(
        &self,
        directory: Option<PathBuf>,
        run: bool,
    ) -> Result<Vec<PathBuf>, WorkspaceError> {
        let _guard = self.guard()?;
        let image = self.load_image()?;
        let ctx = self.exec_context();
        scripts::install(self, &image, &ctx, directory, run)
    }

    /// Fetch the changelog of every locked package into `changelogs/`.
    pub fn sync_changelogs(&self) -> Result<usize, WorkspaceError> {
        let _guard = self.guard()?;
        let image = self.load_image()?;
        let lock = self.load_lock()?;
        self.apt_layout()
            .prepare(&image.repositories, image.exclude_recommends)?;

        let ctx = self.exec_context();
        let apt_get = AptGet::system(&ctx);
        changelogs::sync(&self.changelogs_dir(), &lock, &apt_get)
    }

    /// Audit the locked package set against a security tracker database and
    /// persist the findings as `audit-report.json`.
    pub fn audit(
        &self,
        database: &Path,
        suite: &str,
    ) -> Result<AuditReport, WorkspaceError> {
        let _guard = self.guard()?;
        let lock = self.load_lock()?;
        let db = SecurityDb::open(database)?;
        let ctx = self.exec_context();
        let engine = AuditEngine::new(db, Dpkg::system(&ctx), suite);
        let report = engine.run(&lock)?;
        report.write_to_file(self.report_file())?;
        info!(
            "audited {} source packages, {} open vulnerabilities",
            report.sources.len(),
            report.vulnerability_count()
        );
        Ok(report)
    }
}
