//! Staging of the image's install scripts into a generated rootfs.
//!
//! Scripts land under `<rootfs>/scripts/` with an index prefix so their
//! declared order survives the copy, and can be run in that order inside
//! the tree via chroot.

use std::path::{Path, PathBuf};

use tracing::info;

use drydock_apt::{exec, ExecContext};
use drydock_schema::Image;

use crate::{Workspace, WorkspaceError};

/// Copy each declared script into `<target>/scripts/<index>-<basename>`,
/// marked executable. With `run`, execute each in declared order inside the
/// tree. Returns the staged paths.
pub fn install(
    workspace: &Workspace,
    image: &Image,
    ctx: &ExecContext,
    directory: Option<PathBuf>,
    run: bool,
) -> Result<Vec<PathBuf>, WorkspaceError> {
    let target = match directory {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => std::env::current_dir()?.join(dir),
        None => std::env::current_dir()?.join("rootfs"),
    };

    let mut resolved = Vec::new();
    for descriptor in &image.scripts {
        let path = Path::new(&descriptor.script);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace.root().join(path)
        };
        if !path.is_file() {
            return Err(WorkspaceError::MissingScript(path));
        }
        resolved.push(path);
    }

    if resolved.is_empty() {
        info!("image declares no install scripts");
        return Ok(Vec::new());
    }

    let scripts_dir = target.join("scripts");
    let mut mkdir = ctx.root_command("mkdir");
    mkdir.arg("-p").arg(&scripts_dir);
    exec::run(&mut mkdir)?;

    let mut staged = Vec::new();
    for (index, path) in resolved.iter().enumerate() {
        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "script".to_owned());
        let name = format!("{index}-{base}");
        let dest = scripts_dir.join(&name);

        let mut cp = ctx.root_command("cp");
        cp.arg(path).arg(&dest);
        exec::run(&mut cp)?;
        let mut chmod = ctx.root_command("chmod");
        chmod.arg("+x").arg(&dest);
        exec::run(&mut chmod)?;

        staged.push((dest, name));
    }
    info!("staged {} scripts into {}", staged.len(), scripts_dir.display());

    if run {
        for (_, name) in &staged {
            info!("running /scripts/{name} inside {}", target.display());
            let mut chroot = ctx.root_command("chroot");
            chroot.arg(&target).arg(format!("/scripts/{name}"));
            exec::run(&mut chroot)?;
        }
    }

    Ok(staged.into_iter().map(|(dest, _)| dest).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use drydock_schema::InstallScript;

    fn fixture() -> (tempfile::TempDir, Workspace, ExecContext) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        let ctx = ExecContext::with_elevation(dir.path().join("tmp-apt.conf"), false);
        (dir, workspace, ctx)
    }

    fn image_with_scripts(scripts: &[&str]) -> Image {
        Image {
            scripts: scripts
                .iter()
                .map(|s| InstallScript {
                    script: (*s).to_owned(),
                })
                .collect(),
            ..Image::default()
        }
    }

    #[test]
    fn scripts_are_staged_in_declared_order() {
        let (_dir, workspace, ctx) = fixture();
        fs::write(workspace.root().join("setup-users.sh"), "#!/bin/sh\n").unwrap();
        fs::write(workspace.root().join("cleanup.sh"), "#!/bin/sh\n").unwrap();

        let image = image_with_scripts(&["setup-users.sh", "cleanup.sh"]);
        let target = workspace.root().join("rootfs");
        let staged = install(&workspace, &image, &ctx, Some(target.clone()), false).unwrap();

        assert_eq!(
            staged,
            vec![
                target.join("scripts/0-setup-users.sh"),
                target.join("scripts/1-cleanup.sh"),
            ]
        );
        for path in &staged {
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert!(mode & 0o111 != 0, "{} is not executable", path.display());
        }
    }

    #[test]
    fn missing_script_is_rejected_up_front() {
        let (_dir, workspace, ctx) = fixture();
        let image = image_with_scripts(&["nonexistent.sh"]);
        let target = workspace.root().join("rootfs");

        match install(&workspace, &image, &ctx, Some(target.clone()), false) {
            Err(WorkspaceError::MissingScript(p)) => {
                assert_eq!(p, workspace.root().join("nonexistent.sh"));
            }
            other => panic!("expected MissingScript, got {:?}", other.map(|_| ())),
        }
        assert!(!target.exists());
    }

    #[test]
    fn no_scripts_is_a_clean_no_op() {
        let (_dir, workspace, ctx) = fixture();
        let target = workspace.root().join("rootfs");
        let staged = install(
            &workspace,
            &image_with_scripts(&[]),
            &ctx,
            Some(target.clone()),
            false,
        )
        .unwrap();
        assert!(staged.is_empty());
        assert!(!target.join("scripts").exists());
    }
}
