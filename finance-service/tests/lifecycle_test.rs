//! Connection lifecycle tests: link, refresh, reconnect token, disconnect.

mod common;

use common::{page, provider_txn, FakePlaid, MemoryStore, PageScript};
use finance_service::services::{ConnectionService, SyncEngine};
use service_core::error::AppError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const USER: &str = "user-1";

fn service(store: &Arc<MemoryStore>, plaid: &Arc<FakePlaid>) -> ConnectionService {
    let sync = SyncEngine::new(store.clone(), plaid.clone());
    ConnectionService::new(store.clone(), plaid.clone(), sync)
}

#[tokio::test]
async fn link_creates_connection_and_runs_initial_sync() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::with_pages(vec![PageScript::Page(page(
        vec![provider_txn("t1", "acc-1", "Coffee", 4)],
        vec![],
        vec![],
        "c1",
        false,
    ))]));

    let outcome = service(&store, &plaid)
        .link(USER, "public-sandbox-token", Some("First Platypus Bank".to_string()))
        .await
        .unwrap();

    assert_eq!(outcome.item_id, "item-1");
    assert!(outcome.initial_sync.is_some());
    assert_eq!(store.connection_count(USER), 1);
    assert_eq!(store.transaction_count(), 1);
    assert_eq!(store.cursor(USER, "item-1").as_deref(), Some("c1"));
}

#[tokio::test]
async fn link_survives_a_failed_initial_sync() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::with_pages(vec![PageScript::Fail {
        code: "INSTITUTION_DOWN",
        message: "institution unavailable",
    }]));

    let outcome = service(&store, &plaid)
        .link(USER, "public-sandbox-token", None)
        .await
        .unwrap();

    // Linked but not yet synced; the next refresh resolves it
    assert!(outcome.initial_sync.is_none());
    assert_eq!(store.connection_count(USER), 1);
    assert_eq!(store.transaction_count(), 0);
    assert!(store.cursor(USER, "item-1").is_none());
}

#[tokio::test]
async fn link_fails_when_exchange_fails() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());
    plaid.fail_exchange.store(true, Ordering::SeqCst);

    let result = service(&store, &plaid)
        .link(USER, "public-sandbox-token", None)
        .await;

    assert!(matches!(result, Err(AppError::ProviderError { .. })));
    assert_eq!(store.connection_count(USER), 0);
}

#[tokio::test]
async fn relinking_the_same_item_updates_in_place() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token-a", Some("First Platypus Bank".to_string()))
        .await
        .unwrap();
    // Relink after reconnection: same provider item, no institution name sent
    svc.link(USER, "public-token-b", None).await.unwrap();

    assert_eq!(store.connection_count(USER), 1);
    let connection = store
        .state
        .lock()
        .unwrap()
        .connections
        .first()
        .cloned()
        .unwrap();
    // A null update must not clobber the stored label
    assert_eq!(
        connection.institution_name.as_deref(),
        Some("First Platypus Bank")
    );
}

#[tokio::test]
async fn refresh_unknown_item_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());

    let result = service(&store, &plaid).refresh(USER, "missing-item").await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn refresh_is_scoped_to_the_owning_user() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token", None).await.unwrap();

    let result = svc.refresh("someone-else", "item-1").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn update_link_token_uses_stored_credential() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token", None).await.unwrap();

    let token = svc.update_link_token(USER, "item-1").await.unwrap();
    assert_eq!(token, "link-update-token");

    let result = svc.update_link_token(USER, "missing-item").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn disconnect_purges_data_and_revokes_credential() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::with_pages(vec![PageScript::Page(page(
        vec![
            provider_txn("t1", "acc-1", "Coffee", 4),
            provider_txn("t2", "acc-1", "Groceries", 62),
        ],
        vec![],
        vec![],
        "c1",
        false,
    ))]));

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token", None).await.unwrap();
    assert_eq!(store.transaction_count(), 2);

    svc.disconnect(USER, "item-1").await.unwrap();

    assert_eq!(store.connection_count(USER), 0);
    assert_eq!(store.transactions_for(USER, "item-1").len(), 0);
    assert_eq!(plaid.removed_items(), vec!["access-sandbox-1".to_string()]);

    // Second disconnect finds nothing
    let result = svc.disconnect(USER, "item-1").await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn revoke_failure_does_not_undo_local_deletion() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());
    plaid.fail_remove_item.store(true, Ordering::SeqCst);

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token", None).await.unwrap();

    // Local deletion is the source of truth; the failed revoke is logged only
    svc.disconnect(USER, "item-1").await.unwrap();

    assert_eq!(store.connection_count(USER), 0);
    assert_eq!(plaid.removed_items().len(), 1);
}

#[tokio::test]
async fn refresh_propagates_reauth_required() {
    let store = Arc::new(MemoryStore::new());
    let plaid = Arc::new(FakePlaid::new());

    let svc = service(&store, &plaid);
    svc.link(USER, "public-token", None).await.unwrap();

    plaid.push_page(PageScript::Fail {
        code: "ITEM_LOGIN_REQUIRED",
        message: "the login details of this item have changed",
    });

    let result = svc.refresh(USER, "item-1").await;
    assert!(matches!(result, Err(AppError::ReauthRequired { .. })));
}
