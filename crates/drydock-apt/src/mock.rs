//! In-memory oracles for tests.
//!
//! The mocks answer the same questions the real tools do, from a small
//! described catalog, and record every request they receive so tests can
//! assert on batching and call shape. `MockDpkgSource` carries a pure
//! implementation of Debian version ordering so audit and plan logic can be
//! exercised without a dpkg binary.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::cache::CacheSource;
use crate::dpkg::DpkgSource;
use crate::get::{deb_file_name, InstallSource};
use crate::AptError;

/// One package record served by [`MockCacheSource`].
#[derive(Debug, Clone)]
pub struct MockPackage {
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub essential: bool,
    pub priority: Option<String>,
    pub depends: Option<String>,
    pub pre_depends: Option<String>,
    pub provides: Option<String>,
    pub source: Option<String>,
}

impl MockPackage {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            architecture: "amd64".to_owned(),
            essential: false,
            priority: Some("optional".to_owned()),
            depends: None,
            pre_depends: None,
            provides: None,
            source: None,
        }
    }

    pub fn essential(mut self) -> Self {
        self.essential = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.priority = Some("required".to_owned());
        self
    }

    pub fn important(mut self) -> Self {
        self.priority = Some("important".to_owned());
        self
    }

    pub fn depends(mut self, field: &str) -> Self {
        self.depends = Some(field.to_owned());
        self
    }

    pub fn pre_depends(mut self, field: &str) -> Self {
        self.pre_depends = Some(field.to_owned());
        self
    }

    pub fn provides(mut self, field: &str) -> Self {
        self.provides = Some(field.to_owned());
        self
    }

    pub fn source(mut self, field: &str) -> Self {
        self.source = Some(field.to_owned());
        self
    }

    fn render(&self) -> String {
        let mut block = format!(
            "Package: {}\nVersion: {}\nArchitecture: {}\n",
            self.name, self.version, self.architecture
        );
        if self.essential {
            block.push_str("Essential: yes\n");
        }
        if let Some(priority) = &self.priority {
            block.push_str(&format!("Priority: {priority}\n"));
        }
        if let Some(depends) = &self.depends {
            block.push_str(&format!("Depends: {depends}\n"));
        }
        if let Some(pre_depends) = &self.pre_depends {
            block.push_str(&format!("Pre-Depends: {pre_depends}\n"));
        }
        if let Some(provides) = &self.provides {
            block.push_str(&format!("Provides: {provides}\n"));
        }
        if let Some(source) = &self.source {
            block.push_str(&format!("Source: {source}\n"));
        }
        block.push('\n');
        block
    }
}

/// A requested pin, split back out of its command-line form.
fn split_request_arg(arg: &str) -> (&str, Option<&str>, Option<&str>) {
    let (left, version) = match arg.split_once('=') {
        Some((left, version)) => (left, Some(version)),
        None => (arg, None),
    };
    let (name, architecture) = match left.split_once(':') {
        Some((name, arch)) => (name, Some(arch)),
        None => (left, None),
    };
    (name, architecture, version)
}

/// Catalog oracle backed by an in-memory package list. With an empty
/// catalog it synthesizes a minimal record for whatever is asked, which
/// keeps batching tests independent of fixture size.
#[derive(Default)]
pub struct MockCacheSource {
    packages: Vec<MockPackage>,
    no_candidate: BTreeSet<String>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MockCacheSource {
    pub fn with_packages(packages: Vec<MockPackage>) -> Self {
        Self {
            packages,
            ..Self::default()
        }
    }

    /// Report the named package with no installation candidate.
    pub fn without_candidate(mut self, name: &str) -> Self {
        self.no_candidate.insert(name.to_owned());
        self
    }

    /// Argument counts of every `show`/`policy` request, in order.
    pub fn calls(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, args: usize) {
        self.calls.lock().unwrap().push(args);
    }
}

impl CacheSource for MockCacheSource {
    fn package_names(&self) -> Result<String, AptError> {
        let names: BTreeSet<&str> = self.packages.iter().map(|p| p.name.as_str()).collect();
        let mut output = String::new();
        for name in names {
            output.push_str(name);
            output.push('\n');
        }
        Ok(output)
    }

    fn show(&self, args: &[String]) -> Result<String, AptError> {
        self.record(args.len());
        let mut output = String::new();
        for arg in args {
            let (name, architecture, version) = split_request_arg(arg);
            if self.packages.is_empty() {
                output.push_str(&format!(
                    "Package: {name}\nVersion: {}\nArchitecture: {}\nPriority: optional\n\n",
                    version.unwrap_or("1.0"),
                    architecture.unwrap_or("amd64"),
                ));
                continue;
            }
            for package in &self.packages {
                if package.name != name {
                    continue;
                }
                if version.is_some_and(|v| v != package.version) {
                    continue;
                }
                if architecture.is_some_and(|a| a != package.architecture) {
                    continue;
                }
                output.push_str(&package.render());
            }
        }
        Ok(output)
    }

    fn policy(&self, names: &[String]) -> Result<String, AptError> {
        self.record(names.len());
        let mut output = String::new();
        for name in names {
            if self.no_candidate.contains(name) {
                output.push_str(&format!(
                    "{name}:\n  Installed: (none)\n  Candidate: (none)\n"
                ));
                continue;
            }
            if self.packages.is_empty() {
                output.push_str(&format!(
                    "{name}:\n  Installed: (none)\n  Candidate: 1.0\n"
                ));
                continue;
            }
            let candidate = self
                .packages
                .iter()
                .filter(|p| &p.name == name)
                .map(|p| p.version.as_str())
                .max_by(|a, b| compare_debian_versions(a, b));
            if let Some(candidate) = candidate {
                output.push_str(&format!(
                    "{name}:\n  Installed: (none)\n  Candidate: {candidate}\n"
                ));
            }
        }
        Ok(output)
    }
}

/// Install oracle with a canned simulation transcript.
pub struct MockInstallSource {
    transcript: String,
    changelog_output: String,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
    updates: Arc<Mutex<usize>>,
}

impl MockInstallSource {
    pub fn with_transcript(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_owned(),
            changelog_output: String::new(),
            requests: Arc::default(),
            updates: Arc::default(),
        }
    }

    pub fn changelog_output(mut self, output: &str) -> Self {
        self.changelog_output = output.to_owned();
        self
    }

    /// Argument vectors of every download/simulate/changelog request.
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        Arc::clone(&self.requests)
    }

    pub fn update_count(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.updates)
    }
}

impl InstallSource for MockInstallSource {
    fn update(&self) -> Result<(), AptError> {
        *self.updates.lock().unwrap() += 1;
        Ok(())
    }

    fn download(&self, args: &[String], dir: &Path) -> Result<(), AptError> {
        self.requests.lock().unwrap().push(args.to_vec());
        // Drop an empty archive per request so existence checks pass.
        for arg in args {
            let (name, architecture, version) = split_request_arg(arg);
            let file = deb_file_name(
                name,
                version.unwrap_or("1.0"),
                architecture.unwrap_or("amd64"),
            );
            if dir.is_dir() {
                std::fs::write(dir.join(file), b"")?;
            }
        }
        Ok(())
    }

    fn simulate_install(&self, args: &[String]) -> Result<String, AptError> {
        self.requests.lock().unwrap().push(args.to_vec());
        Ok(self.transcript.clone())
    }

    fn changelog_uris(&self, arg: &str) -> Result<String, AptError> {
        self.requests.lock().unwrap().push(vec![arg.to_owned()]);
        Ok(self.changelog_output.clone())
    }
}

/// Ordering oracle backed by [`compare_debian_versions`].
pub struct MockDpkgSource {
    broken: bool,
    extracted: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
}

impl MockDpkgSource {
    pub fn new() -> Self {
        Self {
            broken: false,
            extracted: Arc::default(),
        }
    }

    /// A comparator that answers `false` to everything, the way a missing
    /// or miswired dpkg reads through exit statuses.
    pub fn broken() -> Self {
        Self {
            broken: true,
            extracted: Arc::default(),
        }
    }

    pub fn extracted(&self) -> Arc<Mutex<Vec<(PathBuf, PathBuf)>>> {
        Arc::clone(&self.extracted)
    }
}

impl Default for MockDpkgSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DpkgSource for MockDpkgSource {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), AptError> {
        self.extracted
            .lock()
            .unwrap()
            .push((archive.to_owned(), dest.to_owned()));
        Ok(())
    }

    fn compare_versions(&self, a: &str, op: &str, b: &str) -> Result<bool, AptError> {
        if self.broken {
            return Ok(false);
        }
        let ordering = compare_debian_versions(a, b);
        Ok(match op {
            "lt" => ordering == Ordering::Less,
            "le" => ordering != Ordering::Greater,
            "eq" => ordering == Ordering::Equal,
            "ne" => ordering != Ordering::Equal,
            "ge" => ordering != Ordering::Less,
            "gt" => ordering == Ordering::Greater,
            _ => false,
        })
    }
}

/// Debian version comparison: `[epoch:]upstream[-revision]`, each segment
/// compared with the alternating letter/digit rules and `~` sorting before
/// everything including the end of the string.
pub fn compare_debian_versions(a: &str, b: &str) -> Ordering {
    let (a_epoch, a_upstream, a_revision) = split_version(a);
    let (b_epoch, b_upstream, b_revision) = split_version(b);
    a_epoch
        .cmp(&b_epoch)
        .then_with(|| compare_segment(a_upstream, b_upstream))
        .then_with(|| compare_segment(a_revision, b_revision))
}

fn split_version(version: &str) -> (u64, &str, &str) {
    let version = version.trim();
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
        None => (0, version),
    };
    match rest.rsplit_once('-') {
        Some((upstream, revision)) => (epoch, upstream, revision),
        None => (epoch, rest, ""),
    }
}

fn char_order(c: char) -> i64 {
    if c == '~' {
        -1
    } else if c.is_ascii_alphabetic() {
        i64::from(c as u32)
    } else {
        i64::from(c as u32) + 256
    }
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        // Non-digit run first; end-of-string sorts between '~' and letters.
        loop {
            let ac = a.get(i).copied().filter(|c| !c.is_ascii_digit());
            let bc = b.get(j).copied().filter(|c| !c.is_ascii_digit());
            if ac.is_none() && bc.is_none() {
                break;
            }
            let x = ac.map_or(0, char_order);
            let y = bc.map_or(0, char_order);
            match x.cmp(&y) {
                Ordering::Equal => {}
                other => return other,
            }
            if ac.is_some() {
                i += 1;
            }
            if bc.is_some() {
                j += 1;
            }
        }
        // Digit run, compared numerically.
        while a.get(i) == Some(&'0') {
            i += 1;
        }
        while b.get(j) == Some(&'0') {
            j += 1;
        }
        let di = i;
        while i < a.len() && a[i].is_ascii_digit() {
            i += 1;
        }
        let dj = j;
        while j < b.len() && b[j].is_ascii_digit() {
            j += 1;
        }
        let run_a = &a[di..i];
        let run_b = &b[dj..j];
        match run_a.len().cmp(&run_b.len()) {
            Ordering::Equal => {
                for (x, y) in run_a.iter().zip(run_b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                }
            }
            other => return other,
        }
    }
    Ordering::Equal
}
