//! Image manifest and descriptor types.
//!
//! Supported documents are OCI image manifests and Docker schema 2
//! manifests, both with `schemaVersion: 2`. Indexes and manifest lists are
//! rejected because a layer cannot be selected from them without a platform.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::OciError;

pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_LIST_MEDIA_TYPE: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// Value sent in the `Accept` header of manifest requests.
pub const MANIFEST_ACCEPT: &str =
    "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json";

/// Content descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,
    /// Digest of the content.
    pub digest: String,
    /// Size in bytes.
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Image manifest.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    /// Parse and validate a manifest body.
    ///
    /// `content_type` is the response `Content-Type`, which registries use
    /// when the document itself omits `mediaType`.
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Self, OciError> {
        let manifest: Manifest = serde_json::from_slice(body)?;

        if manifest.schema_version != 2 {
            return Err(OciError::Parse(format!(
                "unsupported manifest schema version {}",
                manifest.schema_version
            )));
        }

        // Strip parameters such as "; charset=utf-8".
        let header_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty());

        if let Some(media_type) = manifest.media_type.as_deref().or(header_type) {
            match media_type {
                OCI_MANIFEST_MEDIA_TYPE | DOCKER_MANIFEST_MEDIA_TYPE => {}
                // Some registries answer with a generic JSON content type.
                "application/json" if manifest.media_type.is_none() => {}
                OCI_INDEX_MEDIA_TYPE | DOCKER_MANIFEST_LIST_MEDIA_TYPE => {
                    return Err(OciError::Parse(format!(
                        "{media_type} is an index, not an image manifest"
                    )));
                }
                other => {
                    return Err(OciError::Parse(format!(
                        "unsupported manifest media type {other}"
                    )));
                }
            }
        }

        Ok(manifest)
    }

    /// First layer whose media type equals `media_type`.
    pub fn find_layer(&self, media_type: &str) -> Option<&Descriptor> {
        self.layers.iter().find(|l| l.media_type == media_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(media_type: &str, digest: &str, size: u64) -> Descriptor {
        Descriptor {
            media_type: media_type.to_string(),
            digest: digest.to_string(),
            size,
            annotations: None,
        }
    }

    #[test]
    fn test_parse_oci_manifest() {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": "application/vnd.cncf.helm.config.v1+json",
                "digest": "sha256:config",
                "size": 10
            },
            "layers": [
                {"mediaType": "application/vnd.x.icon", "digest": "sha256:d1", "size": 5},
                {"mediaType": "application/vnd.x.readme", "digest": "sha256:d2", "size": 7}
            ]
        });
        let manifest = Manifest::parse(body.to_string().as_bytes(), None).unwrap();
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(
            manifest.find_layer("application/vnd.x.readme").unwrap().digest,
            "sha256:d2"
        );
        assert!(manifest.find_layer("application/vnd.x.missing").is_none());
    }

    #[test]
    fn test_find_layer_returns_first_match() {
        let manifest = Manifest {
            schema_version: 2,
            media_type: None,
            artifact_type: None,
            config: None,
            layers: vec![
                layer("application/vnd.x.icon", "sha256:first", 1),
                layer("application/vnd.x.icon", "sha256:second", 1),
            ],
            annotations: None,
        };
        assert_eq!(
            manifest.find_layer("application/vnd.x.icon").unwrap().digest,
            "sha256:first"
        );
    }

    #[test]
    fn test_media_type_from_content_type_header() {
        let body = br#"{"schemaVersion": 2, "layers": []}"#;
        let manifest = Manifest::parse(
            body,
            Some("application/vnd.docker.distribution.manifest.v2+json; charset=utf-8"),
        )
        .unwrap();
        assert!(manifest.layers.is_empty());
    }

    #[test]
    fn test_rejects_schema_v1() {
        let body = br#"{"schemaVersion": 1, "name": "x", "fsLayers": []}"#;
        assert!(matches!(
            Manifest::parse(body, None),
            Err(OciError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_index() {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": OCI_INDEX_MEDIA_TYPE,
            "manifests": []
        });
        let err = Manifest::parse(body.to_string().as_bytes(), None).unwrap_err();
        assert!(matches!(err, OciError::Parse(msg) if msg.contains("index")));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            Manifest::parse(b"<html>", Some("text/html")),
            Err(OciError::Parse(_))
        ));
    }
}
