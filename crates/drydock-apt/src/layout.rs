//! The private apt directory tree.
//!
//! Every apt invocation runs against a throwaway tree under the workspace
//! (`.apt/`) instead of the host configuration, so resolution sees exactly
//! the manifest's repositories and nothing the host happens to have
//! installed. The tree carries an empty dpkg status file for that reason.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use drydock_schema::AptRepo;

use crate::AptError;

/// Layout of the workspace-private apt tree.
#[derive(Debug, Clone)]
pub struct AptLayout {
    apt_dir: PathBuf,
}

impl AptLayout {
    /// `workspace_root` must be absolute; the generated configuration embeds
    /// the path verbatim.
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            apt_dir: workspace_root.join(".apt"),
        }
    }

    pub fn apt_dir(&self) -> &Path {
        &self.apt_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.apt_dir.join("tmp-apt.conf")
    }

    pub fn sources_list(&self) -> PathBuf {
        self.apt_dir.join("etc/apt/sources.list")
    }

    /// Create the tree and (re)write its generated files. Safe to call
    /// repeatedly.
    pub fn prepare(
        &self,
        repositories: &[AptRepo],
        exclude_recommends: bool,
    ) -> Result<(), AptError> {
        if repositories.is_empty() {
            return Err(AptError::NoRepositories);
        }
        debug!("preparing apt tree at {}", self.apt_dir.display());
        fs::create_dir_all(self.apt_dir.join("etc/apt/preferences.d"))?;
        fs::create_dir_all(self.apt_dir.join("etc/apt/apt.conf.d"))?;
        fs::create_dir_all(self.apt_dir.join("etc/apt/sources.list.d"))?;
        fs::create_dir_all(self.apt_dir.join("var/lib/dpkg"))?;

        let status = self.apt_dir.join("var/lib/dpkg/status");
        if !status.exists() {
            fs::write(&status, "")?;
        }

        write_atomic(&self.sources_list(), &render_sources(repositories))?;
        write_atomic(&self.config_file(), &self.render_config(exclude_recommends))?;
        Ok(())
    }

    fn render_config(&self, exclude_recommends: bool) -> String {
        let mut conf = String::new();
        conf.push_str(&format!("Dir \"{}\";\n", self.apt_dir.display()));
        // Trust anchors stay on the host so signature checks keep working.
        conf.push_str("Dir::Etc::Trusted \"/etc/apt/trusted.gpg\";\n");
        conf.push_str("Dir::Etc::TrustedParts \"/etc/apt/trusted.gpg.d\";\n");
        conf.push_str("Acquire::Check-Valid-Until \"false\";\n");
        conf.push_str(&format!(
            "APT::Install-Recommends \"{}\";\n",
            !exclude_recommends
        ));
        conf.push_str("Acquire::Languages \"none\";\n");
        conf
    }
}

fn render_sources(repositories: &[AptRepo]) -> String {
    let mut sources = String::new();
    for repo in repositories {
        sources.push_str(&repo.to_string());
        sources.push('\n');
        if repo.include_source_packages {
            sources.push_str(&repo.source_twin().to_string());
            sources.push('\n');
        }
    }
    sources
}

fn write_atomic(path: &Path, content: &str) -> Result<(), AptError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| AptError::Io(err.error))?;
    Ok(())
}
