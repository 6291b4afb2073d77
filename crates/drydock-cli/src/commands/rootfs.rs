use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use drydock_core::{RootfsOptions, Workspace};
use std::path::{Path, PathBuf};

pub fn run(
    workspace_dir: &Path,
    directory: Option<PathBuf>,
    overwrite: bool,
    run_stage2: bool,
    json: bool,
) -> Result<u8, String> {
    let workspace = Workspace::open(workspace_dir).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("generating rootfs..."))
    };
    let options = RootfsOptions {
        directory,
        overwrite,
        run_stage2,
    };

    let target = match workspace.generate_rootfs(options) {
        Ok(target) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "rootfs generated");
            }
            target
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "rootfs generation failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let payload = serde_json::json!({
            "rootfs": target,
            "stage2": run_stage2,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("rootfs: {}", target.display());
        if run_stage2 {
            println!("stage2 ran inside the tree; delete /stage2 before shipping it");
        } else {
            println!("run /stage2/stage2.sh inside the tree to configure the packages");
        }
    }
    Ok(EXIT_SUCCESS)
}
