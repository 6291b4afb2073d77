//! Version/architecture identity for a package.
//!
//! Catalog results are keyed by `VersionKey`, never by package name: the
//! same name can resolve to different (version, architecture) pairs across
//! repositories, and two entries are the same candidate exactly when those
//! two fields agree. The package name travels alongside as the enclosing
//! map key.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A (version, architecture) pair identifying one concrete candidate of a
/// package. Either field may be absent; both absent is the
/// [`unspecified`](VersionKey::unspecified) sentinel, meaning "whatever the
/// resolver selects".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

impl VersionKey {
    /// The "accept whatever the resolver selects" sentinel.
    pub const fn unspecified() -> Self {
        Self {
            version: None,
            architecture: None,
        }
    }

    /// A version pin with no architecture qualifier.
    pub fn pinned(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            architecture: None,
        }
    }

    /// A fully qualified (version, architecture) pair.
    pub fn exact(version: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            architecture: Some(architecture.into()),
        }
    }

    pub fn is_unspecified(&self) -> bool {
        self.version.is_none() && self.architecture.is_none()
    }

    /// Render the oracle request argument `name[:arch][=version]`.
    ///
    /// An unspecified key renders as the bare name, leaving the selection
    /// to the oracle.
    pub fn request_arg(&self, name: &str) -> String {
        let mut arg = name.to_owned();
        if let Some(arch) = &self.architecture {
            arg.push(':');
            arg.push_str(arch);
        }
        if let Some(version) = &self.version {
            arg.push('=');
            arg.push_str(version);
        }
        arg
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.version, &self.architecture) {
            (None, None) => f.write_str("latest"),
            (Some(v), None) => f.write_str(v),
            (Some(v), Some(a)) => write!(f, "{v} ({a})"),
            (None, Some(a)) => write!(f, "latest ({a})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn unspecified_is_default() {
        assert_eq!(VersionKey::default(), VersionKey::unspecified());
        assert!(VersionKey::unspecified().is_unspecified());
        assert!(!VersionKey::pinned("1.0").is_unspecified());
    }

    #[test]
    fn equality_is_version_and_architecture() {
        let a = VersionKey::exact("1.2.3", "amd64");
        let b = VersionKey::exact("1.2.3", "amd64");
        let c = VersionKey::exact("1.2.3", "arm64");
        let d = VersionKey::pinned("1.2.3");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn usable_as_map_key() {
        let mut map = HashMap::new();
        map.insert(VersionKey::exact("1.0-1", "amd64"), "first");
        map.insert(VersionKey::exact("1.0-1", "amd64"), "second");
        assert_eq!(map.len(), 1);
        assert_eq!(map[&VersionKey::exact("1.0-1", "amd64")], "second");
    }

    #[test]
    fn request_arg_forms() {
        assert_eq!(VersionKey::unspecified().request_arg("curl"), "curl");
        assert_eq!(VersionKey::pinned("7.68.0-1").request_arg("curl"), "curl=7.68.0-1");
        assert_eq!(
            VersionKey::exact("7.68.0-1", "amd64").request_arg("curl"),
            "curl:amd64=7.68.0-1"
        );
    }

    #[test]
    fn serde_skips_absent_fields() {
        let json = serde_json::to_string(&VersionKey::unspecified()).unwrap();
        assert_eq!(json, "{}");
        let json = serde_json::to_string(&VersionKey::exact("1.0", "amd64")).unwrap();
        assert_eq!(json, r#"{"version":"1.0","architecture":"amd64"}"#);
        let back: VersionKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VersionKey::exact("1.0", "amd64"));
    }

    #[test]
    fn display_forms() {
        assert_eq!(VersionKey::unspecified().to_string(), "latest");
        assert_eq!(VersionKey::pinned("1.0-1").to_string(), "1.0-1");
        assert_eq!(VersionKey::exact("1.0-1", "amd64").to_string(), "1.0-1 (amd64)");
    }
}
