//! Index refresh, downloads, install simulation, and changelog URIs via
//! `apt-get`.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};

use drydock_schema::VersionKey;

use crate::exec::{self, ExecContext};
use crate::AptError;

/// Maximum package arguments per `apt-get download` invocation.
const DOWNLOAD_CHUNK: usize = 5000;

/// Raw transport for `apt-get`; swapped out in tests.
pub trait InstallSource {
    fn update(&self) -> Result<(), AptError>;
    fn download(&self, args: &[String], dir: &Path) -> Result<(), AptError>;
    fn simulate_install(&self, args: &[String]) -> Result<String, AptError>;
    fn changelog_uris(&self, arg: &str) -> Result<String, AptError>;
}

/// Runs the real `apt-get` binary inside an [`ExecContext`].
pub struct SystemInstallSource {
    ctx: ExecContext,
}

impl SystemInstallSource {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

impl InstallSource for SystemInstallSource {
    fn update(&self) -> Result<(), AptError> {
        let mut cmd = self.ctx.apt_command("apt-get");
        cmd.arg("update");
        exec::run(&mut cmd)
    }

    fn download(&self, args: &[String], dir: &Path) -> Result<(), AptError> {
        let mut cmd = self.ctx.apt_command("apt-get");
        cmd.arg("download").args(args).current_dir(dir);
        exec::run(&mut cmd)
    }

    fn simulate_install(&self, args: &[String]) -> Result<String, AptError> {
        let mut cmd = self.ctx.apt_command("apt-get");
        cmd.args(["install", "-s", "-y"]).args(args);
        exec::read(&mut cmd)
    }

    fn changelog_uris(&self, arg: &str) -> Result<String, AptError> {
        let mut cmd = self.ctx.apt_command("apt-get");
        cmd.args(["changelog", "--print-uris", arg]);
        exec::read(&mut cmd)
    }
}

/// The `apt-get` oracle.
pub struct AptGet {
    source: Box<dyn InstallSource>,
    inst_line: Regex,
}

impl AptGet {
    pub fn new(source: Box<dyn InstallSource>) -> Self {
        Self {
            source,
            // Transcript lines look like:
            //   Inst curl (7.64.0-4+deb10u2 Debian:10.13/oldstable [amd64])
            inst_line: Regex::new(r"Inst (\S*) \((\S*)(.*)\[(\S*)\]\)").unwrap(),
        }
    }

    pub fn system(ctx: &ExecContext) -> Self {
        Self::new(Box::new(SystemInstallSource::new(ctx.clone())))
    }

    /// Refresh the package indexes for the configured repositories.
    pub fn update(&self) -> Result<(), AptError> {
        info!("refreshing package indexes");
        self.source.update()
    }

    /// Download the pinned `.deb` archives into `dir`.
    pub fn download(
        &self,
        packages: &BTreeMap<String, VersionKey>,
        dir: &Path,
    ) -> Result<(), AptError> {
        if packages.is_empty() {
            return Err(AptError::EmptyRequest);
        }
        let args: Vec<String> = packages
            .iter()
            .map(|(name, key)| key.request_arg(name))
            .collect();
        for chunk in args.chunks(DOWNLOAD_CHUNK) {
            debug!("downloading {} archives", chunk.len());
            self.source.download(chunk, dir)?;
        }
        Ok(())
    }

    /// Hand the full constraint set to the solver in simulation mode and
    /// collect the packages it would install, with their exact versions and
    /// architectures.
    pub fn simulate_install(
        &self,
        packages: &BTreeMap<String, VersionKey>,
    ) -> Result<BTreeMap<String, VersionKey>, AptError> {
        if packages.is_empty() {
            return Err(AptError::EmptyRequest);
        }
        let args: Vec<String> = packages
            .iter()
            .map(|(name, key)| key.request_arg(name))
            .collect();
        let transcript = self.source.simulate_install(&args)?;
        Ok(self.parse_transcript(&transcript))
    }

    /// Pull the confirmed installation set out of a simulation transcript.
    /// Only `Inst` lines count; everything else the solver prints is noise.
    fn parse_transcript(&self, transcript: &str) -> BTreeMap<String, VersionKey> {
        let mut confirmed = BTreeMap::new();
        for line in transcript.lines() {
            if let Some(caps) = self.inst_line.captures(line) {
                confirmed.insert(caps[1].to_owned(), VersionKey::exact(&caps[2], &caps[4]));
            }
        }
        confirmed
    }

    /// First changelog URI the archive advertises for a pinned package, if
    /// any.
    pub fn changelog_uri(
        &self,
        name: &str,
        key: &VersionKey,
    ) -> Result<Option<String>, AptError> {
        let output = self.source.changelog_uris(&key.request_arg(name))?;
        Ok(parse_changelog_uri(&output))
    }
}

/// Filename `apt-get download` writes for a pinned package. Colons in the
/// version (epoch separators) come out percent-escaped.
pub fn deb_file_name(name: &str, version: &str, architecture: &str) -> String {
    format!(
        "{name}_{}_{architecture}.deb",
        version.replace(':', "%3a")
    )
}

/// `apt-get changelog --print-uris` prints one quoted URI per line; take the
/// first that looks like a fetchable URL.
fn parse_changelog_uri(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let token = line.split_whitespace().next()?;
        let uri = token.trim_matches('\'');
        if uri.starts_with("http://") || uri.starts_with("https://") {
            Some(uri.to_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInstallSource;

    const TRANSCRIPT: &str = "\
NOTE: This is only a simulation!
      apt-get needs root privileges for real execution.
Reading package lists...
Building dependency tree...
The following NEW packages will be installed:
  curl libc6 libcurl4
Inst libc6 (2.28-10+deb10u1 Debian:10.13/oldstable, Debian-Security:10/oldstable [amd64])
Inst libcurl4 (7.64.0-4+deb10u2 Debian-Security:10/oldstable [amd64])
Inst curl (7.64.0-4+deb10u2 Debian-Security:10/oldstable [amd64])
Conf libc6 (2.28-10+deb10u1 Debian:10.13/oldstable [amd64])
Conf libcurl4 (7.64.0-4+deb10u2 Debian-Security:10/oldstable [amd64])
Conf curl (7.64.0-4+deb10u2 Debian-Security:10/oldstable [amd64])
";

    fn oracle_for(transcript: &str) -> AptGet {
        AptGet::new(Box::new(MockInstallSource::with_transcript(transcript)))
    }

    #[test]
    fn transcript_inst_lines_become_pins() {
        let oracle = oracle_for(TRANSCRIPT);
        let confirmed = oracle.parse_transcript(TRANSCRIPT);
        assert_eq!(confirmed.len(), 3);
        assert_eq!(
            confirmed["curl"],
            VersionKey::exact("7.64.0-4+deb10u2", "amd64")
        );
        assert_eq!(
            confirmed["libc6"],
            VersionKey::exact("2.28-10+deb10u1", "amd64")
        );
    }

    #[test]
    fn conf_and_chatter_lines_are_ignored() {
        let oracle = oracle_for(TRANSCRIPT);
        let confirmed = oracle.parse_transcript(
            "Reading package lists...\nConf curl (7.64.0-4 Debian [amd64])\n",
        );
        assert!(confirmed.is_empty());
    }

    #[test]
    fn empty_transcript_confirms_nothing() {
        let oracle = oracle_for("");
        assert!(oracle.parse_transcript("").is_empty());
    }

    #[test]
    fn simulate_refuses_an_empty_request() {
        let oracle = oracle_for(TRANSCRIPT);
        let err = oracle.simulate_install(&BTreeMap::new()).unwrap_err();
        assert!(matches!(err, AptError::EmptyRequest));
    }

    #[test]
    fn simulate_renders_pinned_request_args() {
        let source = MockInstallSource::with_transcript(TRANSCRIPT);
        let requests = source.requests();
        let oracle = AptGet::new(Box::new(source));
        let mut packages = BTreeMap::new();
        packages.insert("curl".to_owned(), VersionKey::pinned("7.64.0-4+deb10u2"));
        packages.insert("dash".to_owned(), VersionKey::unspecified());
        oracle.simulate_install(&packages).expect("should simulate");
        let recorded = requests.lock().unwrap().clone();
        assert_eq!(recorded, vec![vec![
            "curl=7.64.0-4+deb10u2".to_owned(),
            "dash".to_owned(),
        ]]);
    }

    #[test]
    fn downloads_are_chunked() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockInstallSource::with_transcript("");
        let requests = source.requests();
        let oracle = AptGet::new(Box::new(source));
        let packages: BTreeMap<String, VersionKey> = (0..5001)
            .map(|i| (format!("pkg{i:04}"), VersionKey::pinned("1.0")))
            .collect();
        oracle
            .download(&packages, dir.path())
            .expect("should download");
        let recorded = requests.lock().unwrap().clone();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].len(), 5000);
        assert_eq!(recorded[1].len(), 1);
    }

    #[test]
    fn archive_names_escape_epoch_colons() {
        assert_eq!(
            deb_file_name("curl", "7.64.0-4+deb10u2", "amd64"),
            "curl_7.64.0-4+deb10u2_amd64.deb"
        );
        assert_eq!(
            deb_file_name("tzdata", "1:2021a-0+deb10u1", "all"),
            "tzdata_1%3a2021a-0+deb10u1_all.deb"
        );
    }

    #[test]
    fn changelog_uri_takes_first_quoted_url() {
        let output =
            "'https://metadata.ftp-master.debian.org/changelogs/main/c/curl/curl_7.64.0-4_changelog' curl.changelog\n";
        assert_eq!(
            parse_changelog_uri(output),
            Some(
                "https://metadata.ftp-master.debian.org/changelogs/main/c/curl/curl_7.64.0-4_changelog"
                    .to_owned()
            )
        );
    }

    #[test]
    fn changelog_uri_absent_when_no_url_lines() {
        assert_eq!(parse_changelog_uri("E: No changelog available\n"), None);
    }
}
