//! Capability contracts for the collaborators application code consumes.
//!
//! Each boundary is a trait so tests can substitute any one of them on its
//! own. The registry and store contracts live in their crates and are
//! re-exported here; email delivery is implemented outside this workspace.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use arthub_oci::{HttpClient, OciPuller};
pub use arthub_store::{Db, Querier, Transaction};

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailData {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email delivery is not configured")]
    NotConfigured,

    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// Delivers emails.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, data: &EmailData) -> Result<(), EmailError>;
}
