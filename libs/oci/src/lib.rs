//! # arthub-oci
//!
//! Pulls a single layer of an OCI artifact (chart icon, readme, metadata
//! blob) from a registry and verifies it against its declared digest.
//!
//! ## Pull sequence
//!
//! 1. Parse the reference (`[oci://]registry/repo[:tag|@digest]`)
//! 2. Fetch the manifest, negotiating basic or bearer-token auth on 401
//! 3. Pick the first layer with the requested media type
//! 4. Fetch the blob and verify size and digest
//!
//! Nothing is cached and nothing is retried; every call starts from an
//! anonymous session.

mod auth;
mod client;
mod digest;
mod error;
mod manifest;
mod puller;
mod reference;
mod transport;

pub use auth::Credentials;
pub use client::{OciClient, OciConfig, Session};
pub use digest::{Algorithm, Digest};
pub use error::OciError;
pub use manifest::{
    Descriptor, Manifest, DOCKER_MANIFEST_MEDIA_TYPE, OCI_INDEX_MEDIA_TYPE,
    OCI_MANIFEST_MEDIA_TYPE,
};
pub use puller::{OciPuller, PulledLayer, RegistryPuller};
pub use reference::{Reference, Target, DOCKER_HUB_REGISTRY};
pub use transport::HttpClient;
