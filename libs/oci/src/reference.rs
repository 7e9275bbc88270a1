//! Artifact reference parsing.

use std::fmt;
use std::str::FromStr;

use crate::digest::Digest;
use crate::error::OciError;

/// Registry host used for references without an explicit registry.
pub const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";

/// Tag or digest selecting a manifest within a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tag(String),
    Digest(Digest),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Tag(tag) => f.write_str(tag),
            Target::Digest(digest) => write!(f, "{digest}"),
        }
    }
}

/// A parsed artifact reference.
///
/// Examples:
/// - `alpine` -> (registry-1.docker.io, library/alpine, latest)
/// - `ghcr.io/org/chart:1.2.0` -> (ghcr.io, org/chart, 1.2.0)
/// - `oci://localhost:5000/foo@sha256:...` -> (localhost:5000, foo, sha256:...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    pub target: Target,
}

impl Reference {
    pub fn digest(&self) -> Option<&Digest> {
        match &self.target {
            Target::Digest(digest) => Some(digest),
            Target::Tag(_) => None,
        }
    }
}

impl FromStr for Reference {
    type Err = OciError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let input = trimmed.strip_prefix("oci://").unwrap_or(trimmed);
        if input.is_empty() {
            return Err(OciError::InvalidReference("empty reference".to_string()));
        }

        let (name, target) = if let Some((name, digest)) = input.rsplit_once('@') {
            // `name:tag@digest` pins by digest; the tag is informational.
            let name = match name.rsplit_once(':') {
                Some((repo, tag)) if !tag.contains('/') => repo,
                _ => name,
            };
            (name, Target::Digest(digest.parse()?))
        } else if let Some((name, tag)) = input.rsplit_once(':') {
            // A colon followed by a slash belongs to a registry port.
            if tag.contains('/') {
                (input, Target::Tag("latest".to_string()))
            } else {
                (name, Target::Tag(tag.to_string()))
            }
        } else {
            (input, Target::Tag("latest".to_string()))
        };

        if let Target::Tag(tag) = &target {
            if tag.is_empty() {
                return Err(OciError::InvalidReference(format!("{s:?} has an empty tag")));
            }
        }

        let (registry, repository) = match name.split_once('/') {
            None => (DOCKER_HUB_REGISTRY.to_string(), format!("library/{name}")),
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                let registry = match first {
                    "docker.io" | "index.docker.io" => DOCKER_HUB_REGISTRY.to_string(),
                    other => other.to_string(),
                };
                (registry, rest.to_string())
            }
            Some(_) => (DOCKER_HUB_REGISTRY.to_string(), name.to_string()),
        };

        if repository.is_empty()
            || repository.ends_with('/')
            || repository == "library/"
            || repository.chars().any(|c| c.is_ascii_uppercase())
        {
            return Err(OciError::InvalidReference(format!(
                "{s:?} has an invalid repository name"
            )));
        }

        Ok(Self {
            registry,
            repository,
            target,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Tag(tag) => write!(f, "{}/{}:{}", self.registry, self.repository, tag),
            Target::Digest(digest) => {
                write!(f, "{}/{}@{}", self.registry, self.repository, digest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("alpine", DOCKER_HUB_REGISTRY, "library/alpine", "latest")]
    #[case("alpine:3.20", DOCKER_HUB_REGISTRY, "library/alpine", "3.20")]
    #[case("myuser/myapp:v1", DOCKER_HUB_REGISTRY, "myuser/myapp", "v1")]
    #[case("docker.io/bitnami/redis:7", DOCKER_HUB_REGISTRY, "bitnami/redis", "7")]
    #[case("ghcr.io/org/repo:v2", "ghcr.io", "org/repo", "v2")]
    #[case("oci://ghcr.io/org/charts/hub:1.2.0", "ghcr.io", "org/charts/hub", "1.2.0")]
    #[case("localhost:5000/myapp:test", "localhost:5000", "myapp", "test")]
    #[case("localhost:5000/myapp", "localhost:5000", "myapp", "latest")]
    #[case("127.0.0.1:5000/a/b", "127.0.0.1:5000", "a/b", "latest")]
    fn test_parse_tag_references(
        #[case] input: &str,
        #[case] registry: &str,
        #[case] repository: &str,
        #[case] tag: &str,
    ) {
        let reference: Reference = input.parse().unwrap();
        assert_eq!(reference.registry, registry);
        assert_eq!(reference.repository, repository);
        assert_eq!(reference.target, Target::Tag(tag.to_string()));
    }

    #[test]
    fn test_parse_digest_reference() {
        let digest = Digest::sha256(b"manifest");
        let input = format!("ghcr.io/org/app@{digest}");
        let reference: Reference = input.parse().unwrap();
        assert_eq!(reference.registry, "ghcr.io");
        assert_eq!(reference.repository, "org/app");
        assert_eq!(reference.digest(), Some(&digest));
        assert_eq!(reference.to_string(), input);
    }

    #[rstest]
    #[case("ghcr.io/org/app:v1@", "ghcr.io", "org/app")]
    #[case("localhost:5000/app@", "localhost:5000", "app")]
    #[case("localhost:5000/app:v1@", "localhost:5000", "app")]
    #[case("oci://alpine:3.20@", DOCKER_HUB_REGISTRY, "library/alpine")]
    fn test_parse_tag_and_digest_reference(
        #[case] prefix: &str,
        #[case] registry: &str,
        #[case] repository: &str,
    ) {
        let digest = Digest::sha256(b"manifest");
        let reference: Reference = format!("{prefix}{digest}").parse().unwrap();
        assert_eq!(reference.registry, registry);
        assert_eq!(reference.repository, repository);
        assert_eq!(reference.digest(), Some(&digest));
    }

    #[test]
    fn test_parse_malformed_digest() {
        let err = "ghcr.io/org/app@sha256:nothex".parse::<Reference>().unwrap_err();
        assert!(matches!(err, OciError::Parse(_)));
    }

    #[rstest]
    #[case("")]
    #[case("oci://")]
    #[case("ghcr.io/")]
    #[case("ghcr.io/Org/App:v1")]
    #[case("alpine:")]
    fn test_parse_invalid(#[case] input: &str) {
        assert!(matches!(
            input.parse::<Reference>(),
            Err(OciError::InvalidReference(_))
        ));
    }
}
