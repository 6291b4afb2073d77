use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use drydock_core::Workspace;
use std::path::{Path, PathBuf};

pub fn run(
    workspace_dir: &Path,
    directory: Option<PathBuf>,
    run_scripts: bool,
    json: bool,
) -> Result<u8, String> {
    let workspace = Workspace::open(workspace_dir).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("installing scripts..."))
    };

    let staged = match workspace.generate_scripts(directory, run_scripts) {
        Ok(staged) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "scripts installed");
            }
            staged
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "script installation failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let payload = serde_json::json!({
            "scripts": staged,
            "ran": run_scripts,
        });
        println!("{}", json_pretty(&payload)?);
    } else if staged.is_empty() {
        println!("the image declares no scripts");
    } else {
        for path in &staged {
            println!("{}", path.display());
        }
        println!(
            "{} scripts {}",
            staged.len(),
            if run_scripts { "installed and run" } else { "installed" }
        );
    }
    Ok(EXIT_SUCCESS)
}
