//! Root filesystem generation from the locked package set.
//!
//! Every archive named by the lock is downloaded, extracted into the target
//! tree, and staged again under `stage2/` together with the image's preseed
//! files and a `stage2.sh` script. The extracted tree alone is not a
//! configured system; running `/stage2/stage2.sh` inside it (chroot or first
//! boot) unpacks the archives properly and configures them with dpkg's own
//! maintainer-script machinery.
//!
//! File operations inside the target go through [`ExecContext::root_command`]
//! because extracted files are root-owned on a real host.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use drydock_apt::{deb_file_name, exec, AptGet, Dpkg, ExecContext};
use drydock_schema::{Image, ImageLock};

use crate::{Workspace, WorkspaceError};

/// Knobs for one rootfs run.
#[derive(Debug, Clone, Default)]
pub struct RootfsOptions {
    /// Target directory; defaults to `rootfs` under the current directory.
    pub directory: Option<PathBuf>,
    /// Delete and recreate the target if it already exists.
    pub overwrite: bool,
    /// Chroot into the finished tree and run the staged script immediately.
    pub run_stage2: bool,
}

pub struct RootfsBuilder<'a> {
    workspace: &'a Workspace,
    ctx: &'a ExecContext,
    apt_get: &'a AptGet,
    dpkg: &'a Dpkg,
}

impl<'a> RootfsBuilder<'a> {
    pub fn new(
        workspace: &'a Workspace,
        ctx: &'a ExecContext,
        apt_get: &'a AptGet,
        dpkg: &'a Dpkg,
    ) -> Self {
        Self {
            workspace,
            ctx,
            apt_get,
            dpkg,
        }
    }

    pub fn generate(
        &self,
        image: &Image,
        lock: &ImageLock,
        options: RootfsOptions,
    ) -> Result<PathBuf, WorkspaceError> {
        if self.ctx.needs_elevation() {
            warn!("not running as root; rootfs file operations will use sudo");
        }

        // Resolve preseeds before any download so manifest mistakes fail fast.
        let mut preseeds = Vec::new();
        for preseed in &image.preseeds {
            let path = resolve_against(self.workspace.root(), preseed);
            if !path.is_file() {
                return Err(WorkspaceError::MissingPreseed(path));
            }
            preseeds.push(path);
        }

        let target = resolve_target(options.directory)?;
        self.prepare_target(&target, options.overwrite)?;
        self.create_skeleton(&target)?;

        let debs_dir = self.workspace.archives_dir();
        fs::create_dir_all(&debs_dir)?;

        let mut pinned: BTreeMap<String, _> = BTreeMap::new();
        let mut archives = Vec::new();
        for (name, entry) in &lock.installed_packages {
            let (Some(version), Some(architecture)) =
                (&entry.version.version, &entry.version.architecture)
            else {
                return Err(WorkspaceError::IncompleteLockEntry {
                    package: name.clone(),
                });
            };
            pinned.insert(name.clone(), entry.version.clone());
            archives.push(deb_file_name(name, version, architecture));
        }
        info!("downloading {} archives", pinned.len());
        self.apt_get.download(&pinned, &debs_dir)?;

        info!("extracting {} packages into {}", archives.len(), target.display());
        for file_name in &archives {
            let archive = debs_dir.join(file_name);
            if !archive.is_file() {
                return Err(WorkspaceError::MissingArchive(archive));
            }
            self.dpkg.extract(&archive, &target)?;
            let mut cp = self.ctx.root_command("cp");
            cp.arg(&archive).arg(target.join("stage2/debs").join(file_name));
            exec::run(&mut cp)?;
        }

        let staged_preseeds = self.stage_preseeds(&target, &preseeds)?;
        self.write_stage2(&target, &staged_preseeds, &archives)?;

        if options.run_stage2 {
            info!("running stage2 inside {}", target.display());
            let mut chroot = self.ctx.root_command("chroot");
            chroot.arg(&target).arg("/stage2/stage2.sh");
            exec::run(&mut chroot)?;
        }

        info!("rootfs generated at {}", target.display());
        Ok(target)
    }

    fn prepare_target(&self, target: &Path, overwrite: bool) -> Result<(), WorkspaceError> {
        if target.exists() {
            if overwrite {
                let mut rm = self.ctx.root_command("rm");
                rm.arg("-rf").arg(target);
                exec::run(&mut rm)?;
            } else if fs::read_dir(target)?.next().is_some() {
                return Err(WorkspaceError::RootfsNotEmpty(target.to_path_buf()));
            }
        }
        let mut mkdir = self.ctx.root_command("mkdir");
        mkdir.arg("-p").arg(target);
        exec::run(&mut mkdir)?;
        Ok(())
    }

    fn create_skeleton(&self, target: &Path) -> Result<(), WorkspaceError> {
        let mut mkdir = self.ctx.root_command("mkdir");
        mkdir.arg("-p");
        for sub in [
            "var/lib/dpkg/info",
            "var/lib/dpkg/updates",
            "etc/apt",
            "stage2/debs",
            "stage2/preseeds",
        ] {
            mkdir.arg(target.join(sub));
        }
        exec::run(&mut mkdir)?;

        let mut touch = self.ctx.root_command("touch");
        touch.arg(target.join("var/lib/dpkg/status"));
        exec::run(&mut touch)?;

        // The tree resolves packages against the same repositories it was
        // built from.
        let mut cp = self.ctx.root_command("cp");
        cp.arg(self.workspace.apt_layout().sources_list())
            .arg(target.join("etc/apt/sources.list"));
        exec::run(&mut cp)?;
        Ok(())
    }

    /// Copy each preseed into `stage2/preseeds` under a content-hashed name
    /// so two preseeds sharing a base name cannot clobber each other.
    fn stage_preseeds(
        &self,
        target: &Path,
        preseeds: &[PathBuf],
    ) -> Result<Vec<String>, WorkspaceError> {
        let mut staged = Vec::new();
        for path in preseeds {
            let content = fs::read(path)?;
            let digest = blake3::hash(&content);
            let hex = digest.to_hex();
            let base = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "preseed".to_owned());
            let name = format!("{base}-{}", &hex[..12]);

            let mut cp = self.ctx.root_command("cp");
            cp.arg(path).arg(target.join("stage2/preseeds").join(&name));
            exec::run(&mut cp)?;
            staged.push(name);
        }
        Ok(staged)
    }

    fn write_stage2(
        &self,
        target: &Path,
        preseeds: &[String],
        archives: &[String],
    ) -> Result<(), WorkspaceError> {
        let script = render_stage2(preseeds, archives);
        let mut tmp = tempfile::NamedTempFile::new()?;
        tmp.write_all(script.as_bytes())?;
        tmp.as_file().sync_all()?;

        let script_path = target.join("stage2/stage2.sh");
        let mut cp = self.ctx.root_command("cp");
        cp.arg(tmp.path()).arg(&script_path);
        exec::run(&mut cp)?;
        let mut chmod = self.ctx.root_command("chmod");
        chmod.arg("+x").arg(&script_path);
        exec::run(&mut chmod)?;
        Ok(())
    }
}

fn resolve_target(directory: Option<PathBuf>) -> Result<PathBuf, WorkspaceError> {
    let target = directory.unwrap_or_else(|| PathBuf::from("rootfs"));
    if target.is_absolute() {
        Ok(target)
    } else {
        Ok(std::env::current_dir()?.join(target))
    }
}

fn resolve_against(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn render_stage2(preseeds: &[String], archives: &[String]) -> String {
    let mut script = String::from("#!/bin/sh\nset -e\n\n");
    script.push_str("export DEBIAN_FRONTEND=noninteractive\n");
    script.push_str("export DEBCONF_NONINTERACTIVE_SEEN=true\n");
    script.push_str("export LC_ALL=C\n");
    script.push_str("export LANGUAGE=C\n");
    script.push_str("export LANG=C\n\n");
    for preseed in preseeds {
        script.push_str(&format!("debconf-set-selections /stage2/preseeds/{preseed}\n"));
    }
    if !preseeds.is_empty() {
        script.push('\n');
    }
    for archive in archives {
        script.push_str(&format!(
            "dpkg --unpack --force-confnew --force-overwrite --force-depends /stage2/debs/{archive}\n"
        ));
    }
    script.push_str("\ndpkg --configure -a\n");
    script.push_str("echo \"DONE! Don't forget to delete /stage2\"\n");
    script
}
