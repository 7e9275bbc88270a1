//! Wiring tests for `Services` with every collaborator substituted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arthub_hub::external::{EmailData, EmailError, EmailSender};
use arthub_hub::Services;
use arthub_oci::{Credentials, Descriptor, OciError, OciPuller, PulledLayer};
use arthub_store::{Db, DbError, JsonQuery, Pagination, Querier, SqlArg, Transaction};
use async_trait::async_trait;
use bytes::Bytes;
use rstest::rstest;
use serde_json::{json, Value};

/// Records the credentials of every pull and returns a fixed layer.
#[derive(Default)]
struct RecordingPuller {
    calls: Mutex<Vec<(String, String, Option<Credentials>)>>,
}

#[async_trait]
impl OciPuller for RecordingPuller {
    async fn pull_layer(
        &self,
        reference: &str,
        media_type: &str,
        credentials: Option<&Credentials>,
    ) -> Result<PulledLayer, OciError> {
        self.calls.lock().unwrap().push((
            reference.to_string(),
            media_type.to_string(),
            credentials.cloned(),
        ));

        if media_type == "application/missing" {
            return Err(OciError::LayerNotFound {
                media_type: media_type.to_string(),
            });
        }

        let data = Bytes::from_static(b"icon-bytes");
        Ok(PulledLayer {
            descriptor: Descriptor {
                media_type: media_type.to_string(),
                digest: "sha256:00".to_string(),
                size: data.len() as u64,
                annotations: None,
            },
            data,
        })
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<EmailData>>,
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send_email(&self, data: &EmailData) -> Result<(), EmailError> {
        self.sent.lock().unwrap().push(data.clone());
        Ok(())
    }
}

/// Serves a fixed row set; counts commits so the wiring can be checked.
#[derive(Clone, Default)]
struct FixedDb {
    rows: Arc<Vec<Value>>,
    commits: Arc<AtomicUsize>,
}

struct FixedTx {
    rows: Arc<Vec<Value>>,
    commits: Arc<AtomicUsize>,
}

fn int_arg(arg: Option<&SqlArg>) -> usize {
    match arg {
        Some(SqlArg::Int(v)) => *v as usize,
        other => panic!("expected integer argument, got {other:?}"),
    }
}

#[async_trait]
impl Querier for FixedTx {
    async fn exec(&mut self, _sql: &str, _args: &[SqlArg]) -> Result<u64, sqlx::Error> {
        Ok(0)
    }

    async fn query_count(&mut self, _sql: &str, _args: &[SqlArg]) -> Result<i64, sqlx::Error> {
        Ok(self.rows.len() as i64)
    }

    async fn query_json(&mut self, _sql: &str, args: &[SqlArg]) -> Result<Vec<Value>, sqlx::Error> {
        let limit = int_arg(args.get(args.len() - 2));
        let offset = int_arg(args.last());
        Ok(self.rows.iter().skip(offset).take(limit).cloned().collect())
    }
}

#[async_trait]
impl Transaction for FixedTx {
    async fn commit(self) -> Result<(), sqlx::Error> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

impl FixedDb {
    fn with_rows(n: usize) -> Self {
        Self {
            rows: Arc::new((0..n).map(|i| json!({ "id": i })).collect()),
            commits: Arc::default(),
        }
    }

    fn tx(&self) -> FixedTx {
        FixedTx {
            rows: Arc::clone(&self.rows),
            commits: Arc::clone(&self.commits),
        }
    }
}

#[async_trait]
impl Db for FixedDb {
    type Conn = FixedTx;
    type Tx = FixedTx;

    async fn acquire(&self) -> Result<FixedTx, DbError> {
        Ok(self.tx())
    }

    async fn begin(&self) -> Result<FixedTx, DbError> {
        Ok(self.tx())
    }

    async fn begin_snapshot(&self) -> Result<FixedTx, DbError> {
        Ok(self.tx())
    }
}

fn services(puller: Arc<RecordingPuller>, db: FixedDb) -> Services<FixedDb> {
    Services::new(puller, db)
}

#[rstest]
#[case("", "", None)]
#[case("robot", "s3cret", Some(Credentials::new("robot", "s3cret")))]
#[case("robot", "", Some(Credentials::new("robot", "")))]
#[tokio::test]
async fn test_pull_layer_maps_credentials(
    #[case] username: &str,
    #[case] password: &str,
    #[case] expected: Option<Credentials>,
) {
    let puller = Arc::new(RecordingPuller::default());
    let services = services(Arc::clone(&puller), FixedDb::default());

    let layer = services
        .pull_layer(
            "oci://ghcr.io/org/chart:1.0.0",
            "image/png",
            username,
            password,
        )
        .await
        .unwrap();

    assert_eq!(layer.data, Bytes::from_static(b"icon-bytes"));
    assert_eq!(layer.descriptor.size, 10);

    let calls = puller.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "oci://ghcr.io/org/chart:1.0.0");
    assert_eq!(calls[0].1, "image/png");
    assert_eq!(calls[0].2, expected);
}

#[tokio::test]
async fn test_pull_layer_passes_errors_through() {
    let services = services(Arc::new(RecordingPuller::default()), FixedDb::default());

    let err = services
        .pull_layer("ghcr.io/org/chart:1.0.0", "application/missing", "", "")
        .await
        .unwrap_err();

    assert!(matches!(err, OciError::LayerNotFound { ref media_type } if media_type == "application/missing"));
}

#[tokio::test]
async fn test_run_paginated_query_uses_injected_db() {
    let db = FixedDb::with_rows(25);
    let services = services(Arc::new(RecordingPuller::default()), db.clone());

    let query = JsonQuery::new("SELECT data FROM packages ORDER BY id LIMIT $1 OFFSET $2");
    let count = JsonQuery::new("SELECT count(*) FROM packages");
    let result = services
        .run_paginated_query(&query, &count, Pagination::new(10, 20))
        .await
        .unwrap();

    assert_eq!(result.total_count, 25);
    assert_eq!(result.data, (20..25).map(|i| json!({ "id": i })).collect::<Vec<_>>());
    assert_eq!(db.commits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_email_sender_is_optional() {
    let puller = Arc::new(RecordingPuller::default());
    let without = services(Arc::clone(&puller), FixedDb::default());
    assert!(without.email_sender().is_none());

    let sender = Arc::new(RecordingSender::default());
    let with = Services::with_email_sender(puller, FixedDb::default(), sender.clone());
    let email = EmailData {
        to: "owner@example.com".to_string(),
        subject: "Package published".to_string(),
        body: "chart 1.0.0 is live".to_string(),
    };

    with.email_sender().unwrap().send_email(&email).await.unwrap();

    assert_eq!(*sender.sent.lock().unwrap(), vec![email]);
}

#[tokio::test]
async fn test_clones_share_collaborators() {
    let puller = Arc::new(RecordingPuller::default());
    let services = services(Arc::clone(&puller), FixedDb::default());
    let clone = services.clone();

    clone.pull_layer("ghcr.io/org/chart:1.0.0", "image/png", "", "").await.unwrap();
    services.pull_layer("ghcr.io/org/chart:1.0.0", "image/png", "", "").await.unwrap();

    assert_eq!(puller.calls.lock().unwrap().len(), 2);
    assert!(Arc::ptr_eq(services.oci_puller(), clone.oci_puller()));
}
