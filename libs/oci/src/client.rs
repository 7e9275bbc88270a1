//! OCI registry client for pulling manifests and blobs.
//!
//! This module implements the read side of the OCI Distribution
//! Specification, including the token authentication flow registries use
//! to gate pulls.
//!
//! Reference: https://github.com/opencontainers/distribution-spec

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use reqwest::header::{
    HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT, WWW_AUTHENTICATE,
};
use reqwest::{Client, Method, Request, Response, StatusCode, Url};
use tracing::debug;

use crate::auth::{Challenge, Credentials, TokenResponse};
use crate::digest::Digest;
use crate::error::OciError;
use crate::manifest::{Descriptor, Manifest, MANIFEST_ACCEPT};
use crate::reference::Reference;
use crate::transport::HttpClient;

/// Configuration for the OCI client.
#[derive(Debug, Clone)]
pub struct OciConfig {
    /// Talk plain `http://` to registries (local registries and tests).
    pub plain_http: bool,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Max manifest document size.
    pub max_manifest_size: u64,
    /// Max layer size accepted for in-memory pulls.
    pub max_layer_size: u64,
}

impl Default for OciConfig {
    fn default() -> Self {
        Self {
            plain_http: false,
            user_agent: concat!("arthub/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(60),
            max_manifest_size: 4 * 1024 * 1024, // 4 MiB
            max_layer_size: 32 * 1024 * 1024,   // 32 MiB
        }
    }
}

impl OciConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let plain_http = std::env::var("HUB_OCI_PLAIN_HTTP")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(defaults.plain_http);

        let request_timeout = std::env::var("HUB_OCI_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let max_layer_size = std::env::var("HUB_OCI_MAX_LAYER_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_layer_size);

        Self {
            plain_http,
            request_timeout,
            max_layer_size,
            ..defaults
        }
    }
}

/// OCI Distribution client.
///
/// Holds only configuration and the transport; authorization negotiated for
/// a pull lives in the [`Session`] for that pull.
pub struct OciClient<C = Client> {
    config: OciConfig,
    transport: C,
}

impl OciClient<Client> {
    /// Create a new OCI client backed by reqwest.
    pub fn new(config: OciConfig) -> Result<Self, OciError> {
        let transport = Client::builder().user_agent(config.user_agent.clone()).build()?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<C: HttpClient> OciClient<C> {
    pub fn with_transport(config: OciConfig, transport: C) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &OciConfig {
        &self.config
    }

    /// Start a session against the repository named by `reference`.
    pub fn session<'a>(
        &'a self,
        reference: &'a Reference,
        credentials: Option<&'a Credentials>,
    ) -> Session<'a, C> {
        let scheme = if self.config.plain_http { "http" } else { "https" };
        Session {
            client: self,
            reference,
            credentials,
            base_url: format!("{scheme}://{}", reference.registry),
            authorization: None,
        }
    }
}

/// A single pull's view of a repository.
pub struct Session<'a, C> {
    client: &'a OciClient<C>,
    reference: &'a Reference,
    credentials: Option<&'a Credentials>,
    base_url: String,
    authorization: Option<String>,
}

impl<C: HttpClient> Session<'_, C> {
    /// Pull the manifest the reference points at.
    ///
    /// Digest references are verified against the manifest bytes.
    pub async fn pull_manifest(&mut self) -> Result<Manifest, OciError> {
        let url = self.url(&format!(
            "/v2/{}/manifests/{}",
            self.reference.repository, self.reference.target
        ))?;

        debug!(url = %url, "Pulling manifest");

        let response = self.send(&url, Some(MANIFEST_ACCEPT)).await?;

        let limit = self.client.config.max_manifest_size;
        if response.content_length().is_some_and(|size| size > limit) {
            return Err(OciError::Parse(format!(
                "manifest exceeds {limit} bytes"
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_body(response, limit)
            .await?
            .ok_or_else(|| OciError::Parse(format!("manifest exceeds {limit} bytes")))?;

        if let Some(digest) = self.reference.digest() {
            digest.verify(&body)?;
        }

        Manifest::parse(&body, content_type.as_deref())
    }

    /// Pull a blob into memory and verify it against its descriptor.
    pub async fn pull_blob(&mut self, descriptor: &Descriptor) -> Result<Bytes, OciError> {
        let digest: Digest = descriptor.digest.parse()?;

        let limit = self.client.config.max_layer_size;
        if descriptor.size > limit {
            return Err(OciError::TooLarge {
                size: descriptor.size,
                limit,
            });
        }

        let url = self.url(&format!(
            "/v2/{}/blobs/{}",
            self.reference.repository, digest
        ))?;

        debug!(url = %url, size = descriptor.size, "Pulling blob");

        let response = self.send(&url, None).await?;

        if let Some(size) = response.content_length() {
            if size > limit {
                return Err(OciError::TooLarge { size, limit });
            }
        }

        // Chunked responses carry no Content-Length; never read past the
        // declared size, which is already within the limit.
        let bytes = read_body(response, descriptor.size)
            .await?
            .ok_or_else(|| OciError::Integrity {
                expected: format!("{} bytes", descriptor.size),
                actual: format!("more than {} bytes", descriptor.size),
            })?;
        if bytes.len() as u64 != descriptor.size {
            return Err(OciError::Integrity {
                expected: format!("{} bytes", descriptor.size),
                actual: format!("{} bytes", bytes.len()),
            });
        }

        digest.verify(&bytes)?;
        Ok(bytes)
    }

    fn url(&self, path: &str) -> Result<Url, OciError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| OciError::InvalidReference(format!("{}: {e}", self.reference)))
    }

    fn request(&self, url: &Url, accept: Option<&str>) -> Result<Request, OciError> {
        let mut request = Request::new(Method::GET, url.clone());
        *request.timeout_mut() = Some(self.client.config.request_timeout);

        let headers = request.headers_mut();
        if let Ok(agent) = HeaderValue::from_str(&self.client.config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }
        if let Some(accept) = accept.and_then(|a| HeaderValue::from_str(a).ok()) {
            headers.insert(ACCEPT, accept);
        }
        if let Some(authorization) = &self.authorization {
            let mut value = HeaderValue::from_str(authorization).map_err(|_| {
                OciError::Authentication("authorization is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(request)
    }

    /// Send a GET, negotiating authorization once if the registry asks.
    async fn send(&mut self, url: &Url, accept: Option<&str>) -> Result<Response, OciError> {
        let response = self.execute(self.request(url, accept)?).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response);
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                OciError::Authentication(format!("{url} returned 401 without a challenge"))
            })
            .and_then(Challenge::parse)?;

        self.authorize(challenge).await?;

        let response = self.execute(self.request(url, accept)?).await?;
        check_status(response)
    }

    async fn authorize(&mut self, challenge: Challenge) -> Result<(), OciError> {
        match challenge {
            Challenge::Basic => {
                let credentials = self.credentials.ok_or_else(|| {
                    OciError::Authentication("registry requires credentials".to_string())
                })?;
                self.authorization = Some(credentials.basic_authorization());
            }
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let token = self.fetch_token(&realm, service.as_deref(), scope).await?;
                self.authorization = Some(format!("Bearer {token}"));
            }
        }
        Ok(())
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: Option<String>,
    ) -> Result<String, OciError> {
        let mut url = Url::parse(realm)
            .map_err(|e| OciError::Authentication(format!("invalid token realm {realm:?}: {e}")))?;
        let scope =
            scope.unwrap_or_else(|| format!("repository:{}:pull", self.reference.repository));
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", &scope);
        }

        debug!(
            realm = %realm,
            scope = %scope,
            authenticated = self.credentials.is_some(),
            "Requesting registry token"
        );

        let mut request = Request::new(Method::GET, url);
        *request.timeout_mut() = Some(self.client.config.request_timeout);
        if let Some(credentials) = self.credentials {
            let mut value = HeaderValue::from_str(&credentials.basic_authorization())
                .map_err(|_| {
                    OciError::Authentication("credentials are not a valid header value".to_string())
                })?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let response = self.execute(request).await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OciError::Authentication(format!(
                "token endpoint rejected the request with {status}"
            )));
        }
        if !status.is_success() {
            return Err(OciError::Registry {
                status,
                url: response.url().to_string(),
            });
        }

        let body = read_body(response, self.client.config.max_manifest_size)
            .await?
            .ok_or_else(|| OciError::Authentication("token response is too large".to_string()))?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| OciError::Authentication(format!("malformed token response: {e}")))?;
        token
            .into_token()
            .ok_or_else(|| OciError::Authentication("token response carried no token".to_string()))
    }

    async fn execute(&self, request: Request) -> Result<Response, OciError> {
        self.client
            .transport
            .execute(request)
            .await
            .map_err(transport_error)
    }
}

fn check_status(response: Response) -> Result<Response, OciError> {
    let status = response.status();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(OciError::NotFound(response.url().to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(OciError::Authentication(
            format!("{} returned {status}", response.url()),
        )),
        _ => Err(OciError::Registry {
            status,
            url: response.url().to_string(),
        }),
    }
}

/// Read a response body chunk by chunk. Returns `None` as soon as the body
/// grows past `limit` bytes.
async fn read_body(mut response: Response, limit: u64) -> Result<Option<Bytes>, OciError> {
    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
        if (body.len() + chunk.len()) as u64 > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(Some(body.freeze()))
}

fn transport_error(err: reqwest::Error) -> OciError {
    if err.is_timeout() {
        OciError::Timeout
    } else {
        OciError::Transport(err)
    }
}
