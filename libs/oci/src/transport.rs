//! Outbound HTTP transport used for every registry interaction.

use async_trait::async_trait;
use reqwest::{Client, Request, Response};

/// Issues a single HTTP request.
///
/// The puller builds requests itself and only needs something that can
/// execute them, so tests and embedding applications can substitute their
/// own transport (for proxies, request signing, recording).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, reqwest::Error>;
}

#[async_trait]
impl HttpClient for Client {
    async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        Client::execute(self, request).await
    }
}
