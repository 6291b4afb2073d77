use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use drydock_core::{InstallOptions, Workspace};
use std::path::Path;

pub fn run(directory: &Path, verify_closure: bool, json: bool) -> Result<u8, String> {
    let workspace = Workspace::open(directory).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("resolving install plan..."))
    };
    let options = InstallOptions { verify_closure };

    let lock = match workspace.install(options) {
        Ok(lock) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "install plan pinned");
            }
            lock
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "install failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&lock)?);
    } else {
        println!("pinned {} packages", lock.installed_packages.len());
        println!("lock: {}", workspace.lock_file().display());
    }
    Ok(EXIT_SUCCESS)
}
