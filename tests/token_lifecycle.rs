//! Lifecycle properties of issued tokens, exercised against real SQLite stores.
//!
//! Covers uniqueness, at-most-once redemption under concurrency, pending-set
//! correctness and the full issue → redeem → re-redeem scenario.

use std::collections::HashSet;
use std::sync::Arc;

use qrpass::models::token::TokenState;
use qrpass::qr::{PngQrEncoder, QrConfig, QrEncoder};
use qrpass::service::{InvalidateError, TokenInvalidator, TokenIssuer, TokenQuery};
use qrpass::store::{SqliteStore, TokenStore};

struct Harness {
    store: Arc<dyn TokenStore>,
    issuer: TokenIssuer,
    query: TokenQuery,
    invalidator: TokenInvalidator,
}

impl Harness {
    fn over(store: Arc<dyn TokenStore>) -> Self {
        let encoder: Arc<dyn QrEncoder> = Arc::new(PngQrEncoder::new(QrConfig::default()));
        Self {
            issuer: TokenIssuer::new(store.clone(), encoder),
            query: TokenQuery::new(store.clone()),
            invalidator: TokenInvalidator::new(store.clone()),
            store,
        }
    }

    async fn in_memory() -> Self {
        let store = SqliteStore::connect("sqlite::memory:", None).await.unwrap();
        store.init_schema().await.unwrap();
        Self::over(Arc::new(store))
    }
}

/// A file-backed store with several pooled connections, so concurrent calls
/// really do reach SQLite in parallel.
struct FileDb {
    path: std::path::PathBuf,
}

impl FileDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("qrpass-it-{}.db", uuid::Uuid::new_v4()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
//  Uniqueness
// ═══════════════════════════════════════════════════════════════════

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_issuance_yields_unique_values() {
    let h = Arc::new(Harness::in_memory().await);

    let tasks = (0..50).map(|_| {
        let h = h.clone();
        tokio::spawn(async move { h.issuer.issue_value().await.unwrap().value })
    });
    let values: Vec<String> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let unique: HashSet<&String> = values.iter().collect();
    assert_eq!(unique.len(), 50);
    assert_eq!(h.query.pending_tokens().await.unwrap().len(), 50);
}

// ═══════════════════════════════════════════════════════════════════
//  At-most-once invalidation
// ═══════════════════════════════════════════════════════════════════

async fn race_invalidations(h: Arc<Harness>, value: String, n: usize) -> (usize, usize) {
    let tasks = (0..n).map(|_| {
        let h = h.clone();
        let value = value.clone();
        tokio::spawn(async move { h.invalidator.invalidate(&value).await })
    });

    let mut ok = 0;
    let mut already_used = 0;
    for result in futures::future::join_all(tasks).await {
        match result.unwrap() {
            Ok(()) => ok += 1,
            Err(InvalidateError::AlreadyUsed) => already_used += 1,
            Err(e) => panic!("unexpected outcome: {:?}", e),
        }
    }
    (ok, already_used)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_invalidation_has_single_winner() {
    let h = Arc::new(Harness::in_memory().await);
    let value = h.issuer.issue_value().await.unwrap().value;

    let (ok, already_used) = race_invalidations(h.clone(), value.clone(), 32).await;
    assert_eq!(ok, 1, "exactly one invalidation must succeed");
    assert_eq!(already_used, 31);

    let token = h.store.find(&value).await.unwrap().unwrap();
    assert_eq!(token.state, TokenState::Used);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_invalidation_across_connections() {
    let db = FileDb::new();
    let store = SqliteStore::connect(&db.url(), Some(4)).await.unwrap();
    store.init_schema().await.unwrap();
    let h = Arc::new(Harness::over(Arc::new(store)));

    for _ in 0..5 {
        let value = h.issuer.issue_value().await.unwrap().value;
        let (ok, already_used) = race_invalidations(h.clone(), value, 16).await;
        assert_eq!(ok, 1);
        assert_eq!(already_used, 15);
    }
    h.store.close().await;
}

#[tokio::test]
async fn test_two_stores_on_one_database_share_the_transition() {
    // Two independent pools stand in for two server processes.
    let db = FileDb::new();
    let a = SqliteStore::connect(&db.url(), None).await.unwrap();
    a.init_schema().await.unwrap();
    let b = SqliteStore::connect(&db.url(), None).await.unwrap();
    b.init_schema().await.unwrap();

    let ha = Harness::over(Arc::new(a));
    let hb = Harness::over(Arc::new(b));

    let value = ha.issuer.issue_value().await.unwrap().value;
    assert!(hb.query.pending_tokens().await.unwrap().contains(&value));

    hb.invalidator.invalidate(&value).await.unwrap();
    assert!(matches!(
        ha.invalidator.invalidate(&value).await,
        Err(InvalidateError::AlreadyUsed)
    ));

    ha.store.close().await;
    hb.store.close().await;
}

// ═══════════════════════════════════════════════════════════════════
//  Pending set and scenarios
// ═══════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_pending_set_after_partial_invalidation() {
    let h = Harness::in_memory().await;
    let a = h.issuer.issue_value().await.unwrap().value;
    let b = h.issuer.issue_value().await.unwrap().value;
    let c = h.issuer.issue_value().await.unwrap().value;

    h.invalidator.invalidate(&b).await.unwrap();

    let pending: HashSet<String> = h.query.pending_tokens().await.unwrap().into_iter().collect();
    let expected: HashSet<String> = [a, c].into_iter().collect();
    assert_eq!(pending, expected);
}

#[tokio::test]
async fn test_unknown_value_is_not_found() {
    let h = Harness::in_memory().await;
    assert!(matches!(
        h.invalidator.invalidate("not-a-real-value").await,
        Err(InvalidateError::NotFound)
    ));
}

#[tokio::test]
async fn test_schema_init_is_idempotent() {
    let h = Harness::in_memory().await;
    let value = h.issuer.issue_value().await.unwrap().value;

    h.store.init_schema().await.unwrap();
    h.store.init_schema().await.unwrap();

    assert_eq!(h.query.pending_tokens().await.unwrap(), vec![value.clone()]);
    assert_eq!(
        h.store.find(&value).await.unwrap().unwrap().state,
        TokenState::Pending
    );
}

#[tokio::test]
async fn test_end_to_end_lifecycle() {
    let h = Harness::in_memory().await;

    let issued = h.issuer.issue().await.unwrap();
    let v1 = issued.token.value.clone();
    assert!(!issued.image.is_empty());

    let token = h.store.find(&v1).await.unwrap().unwrap();
    assert_eq!(token.state, TokenState::Pending);
    assert_eq!(token.id, issued.token.id);
    assert!(h.query.pending_tokens().await.unwrap().contains(&v1));

    h.invalidator.invalidate(&v1).await.unwrap();
    let token = h.store.find(&v1).await.unwrap().unwrap();
    assert_eq!(token.state, TokenState::Used);
    assert!(token.used_at.is_some());
    assert!(!h.query.pending_tokens().await.unwrap().contains(&v1));

    assert!(matches!(
        h.invalidator.invalidate(&v1).await,
        Err(InvalidateError::AlreadyUsed)
    ));
}

#[tokio::test]
async fn test_empty_input_leaves_store_untouched() {
    let h = Harness::in_memory().await;
    let value = h.issuer.issue_value().await.unwrap().value;

    assert!(matches!(
        h.invalidator.invalidate("").await,
        Err(InvalidateError::InvalidInput)
    ));

    assert_eq!(h.query.pending_tokens().await.unwrap(), vec![value.clone()]);
    let token = h.store.find(&value).await.unwrap().unwrap();
    assert_eq!(token.state, TokenState::Pending);
    assert!(token.used_at.is_none());
}
