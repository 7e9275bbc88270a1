//! Collaborators shared across request handlers.

use std::sync::Arc;

use arthub_oci::{Credentials, OciError, OciPuller, PulledLayer};
use arthub_store::{Db, DbError, JsonQuery, JsonQueryResult, Pagination, PgDatabase, QueryExecutor};

use crate::external::EmailSender;

/// The registry puller, query executor and email sender a hub process uses.
///
/// Everything is injected through [`Services::new`]; there is no global
/// client or pool, so tests can build isolated instances side by side.
pub struct Services<D = PgDatabase> {
    inner: Arc<ServicesInner<D>>,
}

struct ServicesInner<D> {
    oci_puller: Arc<dyn OciPuller>,
    queries: QueryExecutor<D>,
    email_sender: Option<Arc<dyn EmailSender>>,
}

impl<D> Clone for Services<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Db> Services<D> {
    pub fn new(oci_puller: Arc<dyn OciPuller>, db: D) -> Self {
        Self::build(oci_puller, db, None)
    }

    pub fn with_email_sender(
        oci_puller: Arc<dyn OciPuller>,
        db: D,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self::build(oci_puller, db, Some(email_sender))
    }

    fn build(
        oci_puller: Arc<dyn OciPuller>,
        db: D,
        email_sender: Option<Arc<dyn EmailSender>>,
    ) -> Self {
        Self {
            inner: Arc::new(ServicesInner {
                oci_puller,
                queries: QueryExecutor::new(db),
                email_sender,
            }),
        }
    }

    /// Pull one layer of an artifact. Empty username and password mean
    /// anonymous access.
    pub async fn pull_layer(
        &self,
        reference: &str,
        media_type: &str,
        username: &str,
        password: &str,
    ) -> Result<PulledLayer, OciError> {
        let credentials = Credentials::from_parts(username, password);
        self.inner
            .oci_puller
            .pull_layer(reference, media_type, credentials.as_ref())
            .await
    }

    pub async fn run_paginated_query(
        &self,
        query: &JsonQuery,
        count_query: &JsonQuery,
        pagination: Pagination,
    ) -> Result<JsonQueryResult, DbError> {
        self.inner
            .queries
            .run_paginated_query(query, count_query, pagination)
            .await
    }

    pub fn oci_puller(&self) -> &Arc<dyn OciPuller> {
        &self.inner.oci_puller
    }

    pub fn email_sender(&self) -> Option<&Arc<dyn EmailSender>> {
        self.inner.email_sender.as_ref()
    }
}
