//! Layer puller: resolve a reference, select a layer by media type, fetch
//! and verify it.

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, info};

use crate::auth::Credentials;
use crate::client::{OciClient, OciConfig};
use crate::error::OciError;
use crate::manifest::Descriptor;
use crate::reference::Reference;
use crate::transport::HttpClient;

/// Descriptor of the pulled layer plus its verified content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledLayer {
    /// Digest, media type and actual byte length of the layer.
    pub descriptor: Descriptor,
    pub data: Bytes,
}

/// Pulls a single layer of an artifact.
///
/// Implementations never return bytes that failed digest verification and
/// do not retry; pulls are idempotent so retry policy belongs to the caller.
#[async_trait]
pub trait OciPuller: Send + Sync {
    async fn pull_layer(
        &self,
        reference: &str,
        media_type: &str,
        credentials: Option<&Credentials>,
    ) -> Result<PulledLayer, OciError>;
}

/// [`OciPuller`] that talks to registries over the distribution API.
pub struct RegistryPuller<C = Client> {
    client: OciClient<C>,
}

impl RegistryPuller<Client> {
    pub fn new(config: OciConfig) -> Result<Self, OciError> {
        Ok(Self {
            client: OciClient::new(config)?,
        })
    }
}

impl<C: HttpClient> RegistryPuller<C> {
    /// Create a puller over a caller-supplied transport.
    pub fn with_transport(config: OciConfig, transport: C) -> Self {
        Self {
            client: OciClient::with_transport(config, transport),
        }
    }
}

#[async_trait]
impl<C: HttpClient> OciPuller for RegistryPuller<C> {
    async fn pull_layer(
        &self,
        reference: &str,
        media_type: &str,
        credentials: Option<&Credentials>,
    ) -> Result<PulledLayer, OciError> {
        let start = Instant::now();
        let reference: Reference = reference.parse()?;

        let mut session = self.client.session(&reference, credentials);

        // 1. Resolve the manifest
        let manifest = session.pull_manifest().await?;

        debug!(
            reference = %reference,
            layer_count = manifest.layers.len(),
            "Manifest fetched"
        );

        // 2. Select the layer
        let layer = manifest
            .find_layer(media_type)
            .ok_or_else(|| OciError::LayerNotFound {
                media_type: media_type.to_string(),
            })?;

        // 3. Fetch and verify
        let data = session.pull_blob(layer).await?;

        info!(
            reference = %reference,
            digest = %layer.digest,
            media_type = %media_type,
            size = data.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Layer pulled"
        );

        Ok(PulledLayer {
            descriptor: Descriptor {
                media_type: layer.media_type.clone(),
                digest: layer.digest.clone(),
                size: data.len() as u64,
                annotations: layer.annotations.clone(),
            },
            data,
        })
    }
}
