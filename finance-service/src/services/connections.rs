//! Connection lifecycle: link, refresh, reconnect, disconnect.

use crate::models::{Connection, UpsertConnection};
use crate::services::database::ConnectionStore;
use crate::services::plaid::PlaidApi;
use crate::services::sync::{SyncEngine, SyncSummary};
use chrono::Utc;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;

/// Result of linking a new connection. The link itself is durable once the
/// connection row exists; `initial_sync` is `None` when the first sync pass
/// failed and is left for the next explicit refresh.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub item_id: String,
    pub initial_sync: Option<SyncSummary>,
}

/// Orchestrates connection state transitions against the store, the provider,
/// and the sync engine.
#[derive(Clone)]
pub struct ConnectionService {
    store: Arc<dyn ConnectionStore>,
    provider: Arc<dyn PlaidApi>,
    sync: SyncEngine,
}

impl ConnectionService {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        provider: Arc<dyn PlaidApi>,
        sync: SyncEngine,
    ) -> Self {
        Self {
            store,
            provider,
            sync,
        }
    }

    /// Exchange a public token and persist the connection, then run one sync
    /// pass. The sync is non-blocking for the link: the connection is already
    /// durably created, so a sync failure degrades to "linked but not yet
    /// synced" and is resolved by the next refresh.
    #[instrument(skip(self, public_token, institution_name), fields(user_id = %user_id))]
    pub async fn link(
        &self,
        user_id: &str,
        public_token: &str,
        institution_name: Option<String>,
    ) -> Result<LinkOutcome, AppError> {
        let item = self.provider.exchange_public_token(public_token).await?;

        let connection = self
            .store
            .upsert_connection(&UpsertConnection {
                user_id: user_id.to_string(),
                item_id: item.item_id.clone(),
                access_token: item.access_token.clone(),
                institution_name,
                last_synced_at: Some(Utc::now()),
            })
            .await?;

        let initial_sync = match self
            .sync
            .sync_connection(user_id, &connection.item_id, &item.access_token)
            .await
        {
            Ok(summary) => Some(summary),
            Err(err) => {
                tracing::warn!(
                    item_id = %connection.item_id,
                    error = %err,
                    "Initial sync failed; connection stays linked and unsynced"
                );
                None
            }
        };

        Ok(LinkOutcome {
            item_id: connection.item_id,
            initial_sync,
        })
    }

    /// Run one sync pass for an owned connection.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn refresh(&self, user_id: &str, item_id: &str) -> Result<SyncSummary, AppError> {
        let connection = self.owned_connection(user_id, item_id).await?;
        self.sync
            .sync_connection(user_id, item_id, &connection.access_token)
            .await
    }

    /// Create an update-mode link token bound to the stored credential, for
    /// the provider's reconnection flow. The credential itself is revalidated
    /// by the provider; no local state change is needed here.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn update_link_token(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<String, AppError> {
        let connection = self.owned_connection(user_id, item_id).await?;
        self.provider
            .create_update_link_token(user_id, &connection.access_token)
            .await
    }

    /// Remove a connection. Local deletion is the source of truth and happens
    /// first; credential revocation with the provider is best-effort and never
    /// reverses it.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn disconnect(&self, user_id: &str, item_id: &str) -> Result<(), AppError> {
        let access_token = self
            .store
            .delete_connection(user_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Connection not found")))?;

        if let Err(err) = self.provider.remove_item(&access_token).await {
            tracing::warn!(
                item_id = %item_id,
                error = %err,
                "Credential revoke failed; local connection already removed"
            );
        }

        Ok(())
    }

    async fn owned_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Connection, AppError> {
        self.store
            .get_connection(user_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Connection not found")))
    }
}
