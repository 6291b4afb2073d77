use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use drydock_core::Workspace;
use std::path::Path;

pub fn run(directory: &Path, json: bool) -> Result<u8, String> {
    let workspace = Workspace::open(directory).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("syncing changelogs..."))
    };

    let fetched = match workspace.sync_changelogs() {
        Ok(fetched) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "changelogs synced");
            }
            fetched
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "changelog sync failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        let payload = serde_json::json!({
            "fetched": fetched,
            "directory": workspace.changelogs_dir(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "fetched {} changelogs into {}",
            fetched,
            workspace.changelogs_dir().display()
        );
    }
    Ok(EXIT_SUCCESS)
}
