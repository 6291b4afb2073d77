//! Catalog queries against `apt-cache`.
//!
//! Three queries feed the install pipeline: the full name universe
//! (`pkgnames`), per-package candidate versions (`policy`), and full package
//! records (`show`). Batched queries are chunked so no single command line
//! grows past what the tool accepts; chunking is invisible in the results.

use std::collections::BTreeMap;

use tracing::debug;

use drydock_schema::VersionKey;

use crate::control;
use crate::depend::{parse_dependency_list, Dependency};
use crate::exec::{self, ExecContext};
use crate::AptError;

/// Maximum package arguments per `apt-cache` invocation.
const QUERY_CHUNK: usize = 3000;

/// Raw transport for `apt-cache`; swapped out in tests.
pub trait CacheSource {
    fn package_names(&self) -> Result<String, AptError>;
    fn show(&self, args: &[String]) -> Result<String, AptError>;
    fn policy(&self, names: &[String]) -> Result<String, AptError>;
}

/// Runs the real `apt-cache` binary inside an [`ExecContext`].
pub struct SystemCacheSource {
    ctx: ExecContext,
}

impl SystemCacheSource {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }
}

impl CacheSource for SystemCacheSource {
    fn package_names(&self) -> Result<String, AptError> {
        let mut cmd = self.ctx.apt_command("apt-cache");
        cmd.arg("pkgnames");
        exec::read(&mut cmd)
    }

    fn show(&self, args: &[String]) -> Result<String, AptError> {
        let mut cmd = self.ctx.apt_command("apt-cache");
        cmd.arg("show").args(args);
        exec::read(&mut cmd)
    }

    fn policy(&self, names: &[String]) -> Result<String, AptError> {
        let mut cmd = self.ctx.apt_command("apt-cache");
        cmd.arg("policy").args(names);
        exec::read(&mut cmd)
    }
}

/// One package record from `apt-cache show`, reduced to the facts the
/// install pipeline consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub essential: bool,
    pub priority: Option<String>,
    pub depends: Vec<Dependency>,
    pub pre_depends: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    /// Name of the source package this binary was built from. Defaults to
    /// the package's own name when the record carries no `Source` field.
    pub source_name: String,
    /// Version of the source package; defaults to the binary version.
    pub source_version: String,
}

/// Candidate information from `apt-cache policy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInfo {
    /// `None` when the tool reports the candidate as `(none)`.
    pub candidate: Option<String>,
}

/// The catalog oracle.
pub struct AptCache {
    source: Box<dyn CacheSource>,
}

impl AptCache {
    pub fn new(source: Box<dyn CacheSource>) -> Self {
        Self { source }
    }

    pub fn system(ctx: &ExecContext) -> Self {
        Self::new(Box::new(SystemCacheSource::new(ctx.clone())))
    }

    /// Every package name the configured repositories know about.
    pub fn package_names(&self) -> Result<Vec<String>, AptError> {
        let output = self.source.package_names()?;
        let names: Vec<String> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        debug!("catalog knows {} package names", names.len());
        Ok(names)
    }

    /// Fetch full records for the requested pins, keyed by package name and
    /// then by (version, architecture). A request pinned to a version only
    /// returns the records the catalog has for that pin.
    pub fn show(
        &self,
        requests: &BTreeMap<String, VersionKey>,
    ) -> Result<BTreeMap<String, BTreeMap<VersionKey, PackageInfo>>, AptError> {
        if requests.is_empty() {
            return Err(AptError::EmptyRequest);
        }
        let args: Vec<String> = requests
            .iter()
            .map(|(name, key)| key.request_arg(name))
            .collect();
        let mut records = BTreeMap::new();
        for chunk in args.chunks(QUERY_CHUNK) {
            let output = self.source.show(chunk)?;
            parse_show_output(&output, &mut records)?;
        }
        Ok(records)
    }

    /// Candidate versions for the requested names.
    pub fn policy(&self, names: &[String]) -> Result<BTreeMap<String, PolicyInfo>, AptError> {
        if names.is_empty() {
            return Err(AptError::EmptyRequest);
        }
        let mut policies = BTreeMap::new();
        for chunk in names.chunks(QUERY_CHUNK) {
            let output = self.source.policy(chunk)?;
            parse_policy_output(&output, &mut policies);
        }
        Ok(policies)
    }
}

/// Interpret `apt-cache show` output into package records.
///
/// Blocks without a `Package` field are skipped; a `Package` block without a
/// `Version` is a hard error because every downstream decision keys on it.
fn parse_show_output(
    output: &str,
    into: &mut BTreeMap<String, BTreeMap<VersionKey, PackageInfo>>,
) -> Result<(), AptError> {
    for block in control::blocks(output) {
        let Some(package) = block.get("Package") else {
            continue;
        };
        let version = block.get("Version").ok_or_else(|| AptError::MissingField {
            package: package.to_owned(),
            field: "Version",
        })?;
        let (source_name, source_version) = match block.get("Source") {
            Some(raw) => parse_source_field(raw, version)?,
            None => (package.to_owned(), version.to_owned()),
        };
        let info = PackageInfo {
            essential: block.get("Essential") == Some("yes"),
            priority: block.get("Priority").map(ToOwned::to_owned),
            depends: block
                .get("Depends")
                .map(parse_dependency_list)
                .unwrap_or_default(),
            pre_depends: block
                .get("Pre-Depends")
                .map(parse_dependency_list)
                .unwrap_or_default(),
            provides: block
                .get("Provides")
                .map(parse_dependency_list)
                .unwrap_or_default(),
            source_name,
            source_version,
        };
        let key = VersionKey {
            version: Some(version.to_owned()),
            architecture: block.get("Architecture").map(ToOwned::to_owned),
        };
        into.entry(package.to_owned()).or_default().insert(key, info);
    }
    Ok(())
}

/// Split a `Source` field into source name and version.
///
/// The grammar is `name` or `name (version)`; a bare name means the source
/// version equals the binary version.
fn parse_source_field(raw: &str, binary_version: &str) -> Result<(String, String), AptError> {
    let raw = raw.trim();
    let Some((name, rest)) = raw.split_once(' ') else {
        return Ok((raw.to_owned(), binary_version.to_owned()));
    };
    let version = rest
        .trim()
        .strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .map(str::trim)
        .filter(|version| !version.is_empty());
    match version {
        Some(version) => Ok((name.to_owned(), version.to_owned())),
        None => Err(AptError::MalformedField {
            field: "Source",
            value: raw.to_owned(),
        }),
    }
}

/// Interpret `apt-cache policy` output.
///
/// Package headers are unindented `name:` lines; the candidate rides on an
/// indented `Candidate:` line below, with `(none)` meaning no candidate.
fn parse_policy_output(output: &str, into: &mut BTreeMap<String, PolicyInfo>) {
    let mut current: Option<String> = None;
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            current = Some(line.trim().trim_end_matches(':').to_owned());
            continue;
        }
        let Some(name) = current.as_deref() else {
            continue;
        };
        let trimmed = line.trim();
        if let Some(candidate) = trimmed.strip_prefix("Candidate:") {
            let candidate = candidate.trim();
            let candidate = if candidate.is_empty() || candidate == "(none)" {
                None
            } else {
                Some(candidate.to_owned())
            };
            into.insert(name.to_owned(), PolicyInfo { candidate });
        }
    }
}
