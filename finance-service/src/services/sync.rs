//! Incremental transaction synchronization.
//!
//! Drives the cursor-paginated change feed for one connection: pulls
//! added/modified/removed transactions, merges them idempotently into the
//! store, and persists the cursor once the feed is fully drained.

use crate::models::{ProviderTransaction, TransactionsSyncPage, UpsertTransaction};
use crate::services::database::SyncStore;
use crate::services::metrics::{record_sync_page, record_sync_run, record_sync_transactions};
use crate::services::plaid::PlaidApi;
use dashmap::DashMap;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

/// Outcome of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    pub upserted: usize,
    pub removed: usize,
    pub pages: usize,
    pub cursor: Option<String>,
}

/// Sync engine over an injected store and provider client.
///
/// Runs for the same connection are serialized through a per-connection lock:
/// the cursor read-modify-write must not race, and a second concurrent
/// refresh would only re-fetch the same pages anyway. Runs for different
/// connections proceed independently.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    provider: Arc<dyn PlaidApi>,
    locks: Arc<DashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn SyncStore>, provider: Arc<dyn PlaidApi>) -> Self {
        Self {
            store,
            provider,
            locks: Arc::new(DashMap::new()),
        }
    }

    fn connection_lock(&self, user_id: &str, item_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((user_id.to_string(), item_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Synchronize one connection's transactions.
    ///
    /// The stored cursor is only advanced after every page has been applied.
    /// A failure mid-run leaves the old cursor in place; the next run
    /// re-fetches from it and the idempotent merge absorbs the replay.
    #[instrument(skip(self, access_token), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn sync_connection(
        &self,
        user_id: &str,
        item_id: &str,
        access_token: &str,
    ) -> Result<SyncSummary, AppError> {
        let lock = self.connection_lock(user_id, item_id);
        let _guard = lock.lock().await;

        let result = self.run_sync(user_id, item_id, access_token).await;

        match &result {
            Ok(summary) => {
                record_sync_run("completed");
                tracing::info!(
                    upserted = summary.upserted,
                    removed = summary.removed,
                    pages = summary.pages,
                    "Sync completed"
                );
            }
            Err(AppError::ReauthRequired { .. }) => {
                record_sync_run("reauth_required");
                tracing::warn!("Sync aborted: connection needs reauthentication");
            }
            Err(err) => {
                record_sync_run("failed");
                tracing::error!(error = %err, "Sync failed");
            }
        }

        result
    }

    async fn run_sync(
        &self,
        user_id: &str,
        item_id: &str,
        access_token: &str,
    ) -> Result<SyncSummary, AppError> {
        let mut cursor = self.store.get_cursor(user_id, item_id).await?;

        // Account names are enrichment only. A lookup failure degrades display
        // labels, it does not block the sync.
        let account_names: HashMap<String, String> =
            match self.provider.get_accounts(access_token).await {
                Ok(accounts) => accounts
                    .into_iter()
                    .map(|a| {
                        let name = a.display_name();
                        (a.account_id, name)
                    })
                    .collect(),
                Err(err) => {
                    tracing::warn!(error = %err, "Account lookup failed, syncing without display names");
                    HashMap::new()
                }
            };

        let mut summary = SyncSummary::default();

        loop {
            let page = self
                .provider
                .sync_transactions(access_token, cursor.as_deref())
                .await
                .inspect_err(|_| record_sync_page("error"))?;
            record_sync_page("ok");

            let has_more = page.has_more;
            let TransactionsSyncPage {
                added,
                modified,
                removed,
                next_cursor,
                ..
            } = page;

            // Added and modified merge identically: both are upserts keyed by
            // the provider transaction id.
            let upserts: Vec<UpsertTransaction> = added
                .iter()
                .chain(modified.iter())
                .map(|t| to_upsert(t, &account_names))
                .collect();

            if !upserts.is_empty() {
                self.store
                    .batch_upsert_transactions(user_id, item_id, &upserts)
                    .await?;
                record_sync_transactions("upserted", upserts.len());
                summary.upserted += upserts.len();
            }

            let removed_ids: Vec<String> =
                removed.into_iter().map(|r| r.transaction_id).collect();
            if !removed_ids.is_empty() {
                self.store.batch_delete_transactions(&removed_ids).await?;
                record_sync_transactions("removed", removed_ids.len());
                summary.removed += removed_ids.len();
            }

            summary.pages += 1;
            cursor = Some(next_cursor);

            if !has_more {
                break;
            }
        }

        // Persisted exactly once, after the full drain. An intermediate write
        // would let a later page failure strand unprocessed changes behind an
        // advanced cursor.
        if let Some(ref final_cursor) = cursor {
            self.store.set_cursor(user_id, item_id, final_cursor).await?;
        }
        summary.cursor = cursor;

        Ok(summary)
    }
}

fn to_upsert(
    txn: &ProviderTransaction,
    account_names: &HashMap<String, String>,
) -> UpsertTransaction {
    UpsertTransaction {
        account_id: txn.account_id.clone(),
        plaid_transaction_id: txn.transaction_id.clone(),
        name: txn.display_name(),
        amount: txn.amount,
        date: txn.date,
        account_name: account_names.get(&txn.account_id).cloned(),
        payment_channel: txn.payment_channel.clone(),
        category: txn.category_code(),
    }
}
