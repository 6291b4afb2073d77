//! Changelog retrieval for the locked package set.
//!
//! One file per binary package under `changelogs/`, fetched from the URI
//! `apt-get changelog --print-uris` advertises for the locked version.
//! Already-present files are left alone, so a re-run after adding packages
//! only pulls the new ones.

use std::fs;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use drydock_apt::{exec, AptGet};
use drydock_schema::ImageLock;

use crate::WorkspaceError;

pub fn sync(dir: &Path, lock: &ImageLock, apt_get: &AptGet) -> Result<usize, WorkspaceError> {
    fs::create_dir_all(dir)?;

    let mut fetched = 0;
    for (name, entry) in &lock.installed_packages {
        let dest = dir.join(format!("{name}.changelog"));
        if dest.is_file() {
            debug!("{name} changelog already present, skipped");
            continue;
        }

        let uri = apt_get
            .changelog_uri(name, &entry.version)?
            .ok_or_else(|| WorkspaceError::ChangelogUnavailable {
                package: name.clone(),
            })?;

        info!("fetching changelog for {name}");
        let mut curl = Command::new("curl");
        curl.args(["-fsSL", "--max-time", "120", "-o"])
            .arg(&dest)
            .arg(&uri);
        exec::run(&mut curl)?;
        fetched += 1;
    }
    info!("synced {fetched} changelogs into {}", dir.display());
    Ok(fetched)
}
