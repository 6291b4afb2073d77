//! Install planning: resolve the image manifest into a pinned lock.
//!
//! The pipeline never solves dependencies itself. It seeds the base system
//! from the catalog's Essential/Priority facts, overlays the manifest's
//! declared packages, and hands the whole request to the solver in
//! simulation mode. The simulation transcript is the sole authority on what
//! gets installed; seeds it drops are dropped here too.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use drydock_apt::{AptCache, AptGet, ExecContext, PackageInfo};
use drydock_schema::{Image, ImageLock, LockedPackage, PackageSource, VersionKey};

use crate::WorkspaceError;

type Catalog = BTreeMap<String, BTreeMap<VersionKey, PackageInfo>>;

/// Knobs for one install run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Re-check the finished lock's dependency closure locally and warn on
    /// gaps. The solver stays authoritative either way.
    pub verify_closure: bool,
}

pub struct Planner {
    cache: AptCache,
    apt_get: AptGet,
}

impl Planner {
    pub fn new(cache: AptCache, apt_get: AptGet) -> Self {
        Self { cache, apt_get }
    }

    pub fn system(ctx: &ExecContext) -> Self {
        Self::new(AptCache::system(ctx), AptGet::system(ctx))
    }

    /// Resolve `image` into a lock.
    pub fn plan(&self, image: &Image, options: InstallOptions) -> Result<ImageLock, WorkspaceError> {
        let names = self.cache.package_names()?;
        debug!("catalog lists {} package names", names.len());

        let policies = self.cache.policy(&names)?;
        let mut universe: BTreeMap<String, VersionKey> = BTreeMap::new();
        for (name, policy) in &policies {
            match &policy.candidate {
                Some(candidate) => {
                    universe.insert(name.clone(), VersionKey::pinned(candidate.clone()));
                }
                None => debug!("{name} has no installation candidate, skipped"),
            }
        }
        info!("resolving against {} candidate versions", universe.len());

        let mut catalog = self.cache.show(&universe)?;

        let mut requests: BTreeMap<String, VersionKey> = BTreeMap::new();
        for (name, key) in &universe {
            let Some(record) = lookup_record(&catalog, name, key) else {
                continue;
            };
            if seeds_base_system(record, image.exclude_important) {
                requests.insert(name.clone(), VersionKey::unspecified());
            }
        }
        debug!("seeded {} base-system packages", requests.len());

        for (name, version) in &image.packages {
            let key = if version == "latest" {
                VersionKey::unspecified()
            } else {
                VersionKey::pinned(version.clone())
            };
            requests.insert(name.clone(), key);
        }

        let confirmed = self.apt_get.simulate_install(&requests)?;
        if confirmed.is_empty() {
            return Err(WorkspaceError::EmptySimulation);
        }
        info!("solver confirmed {} packages", confirmed.len());

        // The solver can settle on versions the candidate snapshot never
        // surfaced (held-back pins, other architectures). Fetch records for
        // those before declaring a gap.
        let supplemental: BTreeMap<String, VersionKey> = confirmed
            .iter()
            .filter(|(name, key)| lookup_record(&catalog, name, key).is_none())
            .map(|(name, key)| (name.clone(), key.clone()))
            .collect();
        if !supplemental.is_empty() {
            debug!(
                "fetching {} confirmed records missing from the candidate snapshot",
                supplemental.len()
            );
            for (name, records) in self.cache.show(&supplemental)? {
                catalog.entry(name).or_default().extend(records);
            }
        }

        let mut installed_packages = BTreeMap::new();
        for (name, key) in confirmed {
            let record = lookup_record(&catalog, &name, &key).ok_or_else(|| {
                WorkspaceError::MissingCatalogEntry {
                    package: name.clone(),
                    version: key.version.clone().unwrap_or_default(),
                }
            })?;
            let source = PackageSource {
                name: record.source_name.clone(),
                version: record.source_version.clone(),
            };
            installed_packages.insert(
                name,
                LockedPackage {
                    version: key,
                    source,
                },
            );
        }
        let lock = ImageLock { installed_packages };

        if options.verify_closure {
            let complaints = verify_closure(&lock, &catalog);
            for complaint in &complaints {
                warn!("{complaint}");
            }
            if complaints.is_empty() {
                info!("dependency closure verified locally");
            }
        }

        Ok(lock)
    }
}

/// Whether a catalog record belongs to the base system: Essential packages
/// always, `Priority: required` always, `Priority: important` unless the
/// image opts out.
fn seeds_base_system(record: &PackageInfo, exclude_important: bool) -> bool {
    if record.essential {
        return true;
    }
    match record.priority.as_deref() {
        Some("required") => true,
        Some("important") => !exclude_important,
        _ => false,
    }
}

/// Find the catalog record for a confirmed (name, version, architecture).
/// Candidate-snapshot records carry no architecture on their request key,
/// so an exact miss falls back to matching the version alone.
fn lookup_record<'a>(catalog: &'a Catalog, name: &str, key: &VersionKey) -> Option<&'a PackageInfo> {
    let records = catalog.get(name)?;
    if let Some(record) = records.get(key) {
        return Some(record);
    }
    records
        .iter()
        .find(|(candidate, _)| candidate.version == key.version)
        .map(|(_, record)| record)
}

/// Local sanity check of the finished lock: every Depends/Pre-Depends name
/// of every locked package must be in the lock, directly or through some
/// locked package's Provides. Returns one complaint per unsatisfied entry.
pub fn verify_closure(lock: &ImageLock, catalog: &Catalog) -> Vec<String> {
    let mut provided: BTreeSet<&str> = BTreeSet::new();
    for (name, entry) in &lock.installed_packages {
        provided.insert(name);
        if let Some(record) = lookup_record(catalog, name, &entry.version) {
            for dependency in &record.provides {
                for virtual_name in dependency.names() {
                    provided.insert(virtual_name);
                }
            }
        }
    }

    let mut complaints = Vec::new();
    for (name, entry) in &lock.installed_packages {
        let Some(record) = lookup_record(catalog, name, &entry.version) else {
            continue;
        };
        for dependency in record.depends.iter().chain(&record.pre_depends) {
            if !dependency.names().iter().any(|n| provided.contains(n.as_str())) {
                complaints.push(format!(
                    "{name} depends on {} but the lock contains no provider",
                    dependency.names().join(" | ")
                ));
            }
        }
    }
    complaints
}

#[cfg(test)]
mod tests {
    use super::*;
    use drydock_apt::mock::{MockCacheSource, MockInstallSource, MockPackage};

    fn planner_with(
        packages: Vec<MockPackage>,
        transcript: &str,
    ) -> (Planner, std::sync::Arc<std::sync::Mutex<Vec<Vec<String>>>>) {
        let cache_source = MockCacheSource::with_packages(packages);
        let install_source = MockInstallSource::with_transcript(transcript);
        let requests = install_source.requests();
        let planner = Planner::new(
            AptCache::new(Box::new(cache_source)),
            AptGet::new(Box::new(install_source)),
        );
        (planner, requests)
    }

    fn image_with(packages: &[(&str, &str)]) -> Image {
        Image {
            repositories: vec![],
            packages: packages
                .iter()
                .map(|(n, v)| ((*n).to_owned(), (*v).to_owned()))
                .collect(),
            ..Image::default()
        }
    }

    #[test]
    fn manifest_and_seeds_become_the_lock() {
        let (planner, _) = planner_with(
            vec![
                MockPackage::new("bash", "5.0-6ubuntu1").essential(),
                MockPackage::new("curl", "7.68.0-1ubuntu2"),
            ],
            "Reading package lists...\n\
             Inst bash (5.0-6ubuntu1 Ubuntu:20.04/focal [amd64])\n\
             Inst curl (7.68.0-1ubuntu2 Ubuntu:20.04/focal [amd64])\n\
             Conf bash (5.0-6ubuntu1 Ubuntu:20.04/focal [amd64])\n",
        );

        let lock = planner
            .plan(&image_with(&[("curl", "latest")]), InstallOptions::default())
            .unwrap();

        assert_eq!(lock.installed_packages.len(), 2);
        let bash = &lock.installed_packages["bash"];
        assert_eq!(bash.version, VersionKey::exact("5.0-6ubuntu1", "amd64"));
        assert_eq!(bash.source.name, "bash");
        assert_eq!(bash.source.version, "5.0-6ubuntu1");
        let curl = &lock.installed_packages["curl"];
        assert_eq!(curl.version, VersionKey::exact("7.68.0-1ubuntu2", "amd64"));
    }

    #[test]
    fn seeding_follows_essential_and_priority() {
        let (planner, requests) = planner_with(
            vec![
                MockPackage::new("base-files", "11").essential(),
                MockPackage::new("dpkg", "1.19.7").required(),
                MockPackage::new("netbase", "5.6").important(),
                MockPackage::new("curl", "7.68.0-1"),
            ],
            "Inst base-files (11 Debian:10 [amd64])\n",
        );

        planner
            .plan(&image_with(&[]), InstallOptions::default())
            .unwrap();

        let recorded = requests.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], ["base-files", "dpkg", "netbase"]);
    }

    #[test]
    fn exclude_important_drops_that_tier_only() {
        let (planner, requests) = planner_with(
            vec![
                MockPackage::new("base-files", "11").essential(),
                MockPackage::new("dpkg", "1.19.7").required(),
                MockPackage::new("netbase", "5.6").important(),
            ],
            "Inst base-files (11 Debian:10 [amd64])\n",
        );

        let mut image = image_with(&[]);
        image.exclude_important = true;
        planner.plan(&image, InstallOptions::default()).unwrap();

        let recorded = requests.lock().unwrap();
        assert_eq!(recorded[0], ["base-files", "dpkg"]);
    }

    #[test]
    fn packages_without_a_candidate_are_never_seeded() {
        let cache_source = MockCacheSource::with_packages(vec![
            MockPackage::new("base-files", "11").essential(),
            MockPackage::new("ghost", "1.0").required(),
        ])
        .without_candidate("ghost");
        let install_source =
            MockInstallSource::with_transcript("Inst base-files (11 Debian:10 [amd64])\n");
        let requests = install_source.requests();
        let planner = Planner::new(
            AptCache::new(Box::new(cache_source)),
            AptGet::new(Box::new(install_source)),
        );

        planner
            .plan(&image_with(&[]), InstallOptions::default())
            .unwrap();

        let recorded = requests.lock().unwrap();
        assert_eq!(recorded[0], ["base-files"]);
    }

    #[test]
    fn declared_pin_replaces_the_seed() {
        // bash is seeded from its essential candidate, then the manifest
        // pins it to an older version; the pin must win outright.
        let (planner, requests) = planner_with(
            vec![
                MockPackage::new("bash", "5.0-6").essential(),
                MockPackage::new("bash", "4.4-5"),
            ],
            "Inst bash (4.4-5 Debian:10 [amd64])\n",
        );

        let lock = planner
            .plan(&image_with(&[("bash", "4.4-5")]), InstallOptions::default())
            .unwrap();

        let recorded = requests.lock().unwrap();
        assert_eq!(recorded[0], ["bash=4.4-5"]);
        assert_eq!(
            lock.installed_packages["bash"].version,
            VersionKey::exact("4.4-5", "amd64")
        );
    }

    #[test]
    fn dropped_seeds_stay_out_of_the_lock() {
        // The solver never confirms netbase; the lock must not contain it.
        let (planner, _) = planner_with(
            vec![
                MockPackage::new("base-files", "11").essential(),
                MockPackage::new("netbase", "5.6").important(),
            ],
            "Inst base-files (11 Debian:10 [amd64])\n",
        );

        let lock = planner
            .plan(&image_with(&[]), InstallOptions::default())
            .unwrap();

        assert_eq!(
            lock.installed_packages.keys().collect::<Vec<_>>(),
            ["base-files"]
        );
    }

    #[test]
    fn empty_simulation_is_an_error() {
        let (planner, _) = planner_with(
            vec![MockPackage::new("base-files", "11").essential()],
            "Reading package lists...\nBuilding dependency tree...\n",
        );

        match planner.plan(&image_with(&[]), InstallOptions::default()) {
            Err(WorkspaceError::EmptySimulation) => {}
            other => panic!("expected EmptySimulation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn source_field_resolves_the_lock_source() {
        let (planner, _) = planner_with(
            vec![MockPackage::new("libssl1.1", "1.1.1n-0+deb10u3")
                .essential()
                .source("openssl (1.1.1n-0+deb10u6)")],
            "Inst libssl1.1 (1.1.1n-0+deb10u3 Debian:10 [amd64])\n",
        );

        let lock = planner
            .plan(&image_with(&[]), InstallOptions::default())
            .unwrap();

        let entry = &lock.installed_packages["libssl1.1"];
        assert_eq!(entry.source.name, "openssl");
        assert_eq!(entry.source.version, "1.1.1n-0+deb10u6");
    }

    #[test]
    fn solver_versions_outside_the_snapshot_are_refetched() {
        // Candidate is 7.68.0-1, but the solver settles on the older pin.
        let (planner, _) = planner_with(
            vec![
                MockPackage::new("curl", "7.68.0-1"),
                MockPackage::new("curl", "7.58.0-2"),
                MockPackage::new("base-files", "11").essential(),
            ],
            "Inst base-files (11 Debian:10 [amd64])\n\
             Inst curl (7.58.0-2 Debian:10 [amd64])\n",
        );

        let lock = planner
            .plan(&image_with(&[("curl", "7.58.0-2")]), InstallOptions::default())
            .unwrap();

        let entry = &lock.installed_packages["curl"];
        assert_eq!(entry.version, VersionKey::exact("7.58.0-2", "amd64"));
        assert_eq!(entry.source.version, "7.58.0-2");
    }

    #[test]
    fn confirmed_package_missing_everywhere_is_fatal() {
        let (planner, _) = planner_with(
            vec![MockPackage::new("base-files", "11").essential()],
            "Inst base-files (11 Debian:10 [amd64])\n\
             Inst phantom (9.9 Debian:10 [amd64])\n",
        );

        match planner.plan(&image_with(&[]), InstallOptions::default()) {
            Err(WorkspaceError::MissingCatalogEntry { package, version }) => {
                assert_eq!(package, "phantom");
                assert_eq!(version, "9.9");
            }
            other => panic!("expected MissingCatalogEntry, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn planning_twice_yields_identical_locks() {
        let packages = vec![
            MockPackage::new("bash", "5.0-6").essential(),
            MockPackage::new("curl", "7.68.0-1"),
        ];
        let transcript = "Inst bash (5.0-6 Debian:10 [amd64])\n\
                          Inst curl (7.68.0-1 Debian:10 [amd64])\n";
        let image = image_with(&[("curl", "latest")]);

        let (planner, _) = planner_with(packages.clone(), transcript);
        let first = planner.plan(&image, InstallOptions::default()).unwrap();
        let second = planner.plan(&image, InstallOptions::default()).unwrap();
        assert_eq!(first, second);

        let first_json = serde_json::to_string_pretty(&first).unwrap();
        let second_json = serde_json::to_string_pretty(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn closure_check_reports_missing_providers() {
        let mut catalog: Catalog = BTreeMap::new();
        catalog.entry("curl".to_owned()).or_default().insert(
            VersionKey::exact("7.68.0-1", "amd64"),
            PackageInfo {
                essential: false,
                priority: Some("optional".to_owned()),
                depends: drydock_apt::parse_dependency_list("libcurl4, libc6 (>= 2.17)"),
                pre_depends: vec![],
                provides: vec![],
                source_name: "curl".to_owned(),
                source_version: "7.68.0-1".to_owned(),
            },
        );
        catalog.entry("libc6".to_owned()).or_default().insert(
            VersionKey::exact("2.28-10", "amd64"),
            PackageInfo {
                essential: false,
                priority: Some("required".to_owned()),
                depends: vec![],
                pre_depends: vec![],
                provides: vec![],
                source_name: "glibc".to_owned(),
                source_version: "2.28-10".to_owned(),
            },
        );

        let mut installed_packages = BTreeMap::new();
        for (name, version, source) in [
            ("curl", "7.68.0-1", "curl"),
            ("libc6", "2.28-10", "glibc"),
        ] {
            installed_packages.insert(
                name.to_owned(),
                LockedPackage {
                    version: VersionKey::exact(version, "amd64"),
                    source: PackageSource {
                        name: source.to_owned(),
                        version: version.to_owned(),
                    },
                },
            );
        }
        let lock = ImageLock { installed_packages };

        let complaints = verify_closure(&lock, &catalog);
        assert_eq!(complaints.len(), 1);
        assert!(complaints[0].contains("curl depends on libcurl4"));
    }

    #[test]
    fn closure_check_accepts_virtual_provides() {
        let mut catalog: Catalog = BTreeMap::new();
        catalog.entry("debconf".to_owned()).or_default().insert(
            VersionKey::exact("1.5.71", "all"),
            PackageInfo {
                essential: false,
                priority: Some("important".to_owned()),
                depends: vec![],
                pre_depends: vec![],
                provides: drydock_apt::parse_dependency_list("debconf-2.0"),
                source_name: "debconf".to_owned(),
                source_version: "1.5.71".to_owned(),
            },
        );
        catalog.entry("apt-utils".to_owned()).or_default().insert(
            VersionKey::exact("1.8.2", "amd64"),
            PackageInfo {
                essential: false,
                priority: Some("optional".to_owned()),
                depends: drydock_apt::parse_dependency_list("debconf (>= 1.2) | debconf-2.0"),
                pre_depends: vec![],
                provides: vec![],
                source_name: "apt".to_owned(),
                source_version: "1.8.2".to_owned(),
            },
        );

        let mut installed_packages = BTreeMap::new();
        for (name, version, arch) in [("debconf", "1.5.71", "all"), ("apt-utils", "1.8.2", "amd64")] {
            installed_packages.insert(
                name.to_owned(),
                LockedPackage {
                    version: VersionKey::exact(version, arch),
                    source: PackageSource {
                        name: name.to_owned(),
                        version: version.to_owned(),
                    },
                },
            );
        }
        let lock = ImageLock { installed_packages };

        assert!(verify_closure(&lock, &catalog).is_empty());
    }
}
