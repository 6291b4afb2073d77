use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read image manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse image manifest: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("image manifest not found at {0}")]
    Missing(PathBuf),
    #[error("the image declares no repositories")]
    NoRepositories,
    #[error("empty version literal for package '{0}'")]
    EmptyVersion(String),
}

/// One apt repository line. Renders to its `sources.list` form via
/// [`Display`](fmt::Display); a repository with `include_source_packages`
/// additionally wants its `deb-src` twin emitted (see
/// [`AptRepo::source_twin`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AptRepo {
    #[serde(default)]
    pub trusted: bool,
    pub uri: String,
    pub distribution: String,
    #[serde(default)]
    pub source: bool,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub include_source_packages: bool,
}

impl AptRepo {
    /// The `deb-src` counterpart of a binary repository.
    pub fn source_twin(&self) -> AptRepo {
        AptRepo {
            source: true,
            include_source_packages: false,
            ..self.clone()
        }
    }
}

impl fmt::Display for AptRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.source { "deb-src " } else { "deb " })?;
        if self.trusted {
            f.write_str("[trusted=yes] ")?;
        }
        write!(f, "{} {}", self.uri, self.distribution)?;
        for component in &self.components {
            write!(f, " {component}")?;
        }
        Ok(())
    }
}

/// Relative path to an executable to be installed into (and optionally run
/// inside) the generated rootfs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallScript {
    pub script: String,
}

/// The declared image manifest, read from `image.json` in the workspace
/// root. Unknown fields are tolerated for forward compatibility; the
/// recognized fields are validated strictly by [`Image::validate`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub exclude_important: bool,
    #[serde(default)]
    pub exclude_recommends: bool,
    #[serde(default)]
    pub repositories: Vec<AptRepo>,
    /// Declared packages: name → exact version literal, or `"latest"`.
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preseeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<InstallScript>,
}

impl Image {
    /// Reject manifests that cannot possibly drive an install: no
    /// repositories, or a declared package with an empty version literal.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.repositories.is_empty() {
            return Err(ManifestError::NoRepositories);
        }
        for (name, version) in &self.packages {
            if version.is_empty() {
                return Err(ManifestError::EmptyVersion(name.clone()));
            }
        }
        Ok(())
    }
}

pub fn parse_image_str(input: &str) -> Result<Image, ManifestError> {
    Ok(serde_json::from_str(input)?)
}

/// Read and validate `image.json`. A missing file is reported as
/// [`ManifestError::Missing`] rather than a bare I/O error so the operator
/// sees which file the workspace expected.
pub fn parse_image_file(path: impl AsRef<Path>) -> Result<Image, ManifestError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ManifestError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let image = parse_image_str(&content)?;
    image.validate()?;
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_image() {
        let input = r#"
{
  "excludeImportant": true,
  "excludeRecommends": true,
  "repositories": [
    {
      "trusted": true,
      "uri": "http://deb.debian.org/debian",
      "distribution": "buster",
      "source": false,
      "components": ["main", "contrib"],
      "includeSourcePackages": true
    }
  ],
  "packages": {
    "curl": "latest",
    "openssl": "1.1.1n-0+deb10u3"
  },
  "preseeds": ["preseeds/tzdata.cfg"],
  "scripts": [{"script": "scripts/post-install.sh"}]
}
"#;
        let image = parse_image_str(input).expect("should parse");
        assert!(image.exclude_important);
        assert!(image.exclude_recommends);
        assert_eq!(image.repositories.len(), 1);
        assert_eq!(image.packages["curl"], "latest");
        assert_eq!(image.packages["openssl"], "1.1.1n-0+deb10u3");
        assert_eq!(image.preseeds, vec!["preseeds/tzdata.cfg"]);
        assert_eq!(image.scripts[0].script, "scripts/post-install.sh");
        assert!(image.validate().is_ok());
    }

    #[test]
    fn parses_minimal_image() {
        let input = r#"{"repositories": [{"uri": "http://deb.debian.org/debian", "distribution": "buster"}]}"#;
        let image = parse_image_str(input).expect("should parse");
        assert!(!image.exclude_important);
        assert!(image.packages.is_empty());
        assert!(image.validate().is_ok());
    }

    #[test]
    fn tolerates_unknown_fields() {
        let input = r#"
{
  "repositories": [{"uri": "http://deb.debian.org/debian", "distribution": "buster"}],
  "someFutureKnob": {"nested": true}
}
"#;
        assert!(parse_image_str(input).is_ok());
    }

    #[test]
    fn rejects_empty_repositories() {
        let image = parse_image_str(r#"{"packages": {"curl": "latest"}}"#).unwrap();
        assert!(matches!(
            image.validate(),
            Err(ManifestError::NoRepositories)
        ));
    }

    #[test]
    fn rejects_empty_version_literal() {
        let input = r#"
{
  "repositories": [{"uri": "http://deb.debian.org/debian", "distribution": "buster"}],
  "packages": {"curl": ""}
}
"#;
        let image = parse_image_str(input).unwrap();
        match image.validate() {
            Err(ManifestError::EmptyVersion(name)) => assert_eq!(name, "curl"),
            other => panic!("expected EmptyVersion, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported_by_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.json");
        match parse_image_file(&path) {
            Err(ManifestError::Missing(p)) => assert_eq!(p, path),
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn repo_renders_sources_list_line() {
        let repo = AptRepo {
            trusted: true,
            uri: "http://deb.debian.org/debian".to_owned(),
            distribution: "buster".to_owned(),
            source: false,
            components: vec!["main".to_owned(), "contrib".to_owned()],
            include_source_packages: false,
        };
        assert_eq!(
            repo.to_string(),
            "deb [trusted=yes] http://deb.debian.org/debian buster main contrib"
        );
    }

    #[test]
    fn source_repo_renders_deb_src() {
        let repo = AptRepo {
            trusted: false,
            uri: "http://deb.debian.org/debian".to_owned(),
            distribution: "buster".to_owned(),
            source: true,
            components: vec!["main".to_owned()],
            include_source_packages: false,
        };
        assert_eq!(repo.to_string(), "deb-src http://deb.debian.org/debian buster main");
    }

    #[test]
    fn repo_without_components_has_no_trailing_space() {
        let repo = AptRepo {
            trusted: false,
            uri: "http://example.com/debian".to_owned(),
            distribution: "stable".to_owned(),
            source: false,
            components: Vec::new(),
            include_source_packages: false,
        };
        assert_eq!(repo.to_string(), "deb http://example.com/debian stable");
    }

    #[test]
    fn source_twin_flips_only_source() {
        let repo = AptRepo {
            trusted: true,
            uri: "http://deb.debian.org/debian".to_owned(),
            distribution: "buster".to_owned(),
            source: false,
            components: vec!["main".to_owned()],
            include_source_packages: true,
        };
        let twin = repo.source_twin();
        assert!(twin.source);
        assert!(!twin.include_source_packages);
        assert_eq!(twin.uri, repo.uri);
        assert_eq!(
            twin.to_string(),
            "deb-src [trusted=yes] http://deb.debian.org/debian buster main"
        );
    }
}
