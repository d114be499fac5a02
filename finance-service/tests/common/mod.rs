//! Test helper module for finance-service tests.
//!
//! Provides an in-memory store and a scripted provider client so the sync
//! engine and lifecycle manager can be exercised without Postgres or network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use finance_service::models::{
    Connection, ExchangedItem, HoldingsResponse, ProviderAccount, ProviderTransaction,
    RemovedTransaction, TransactionsSyncPage, UpsertConnection, UpsertTransaction,
};
use finance_service::services::{ConnectionStore, PlaidApi, SyncStore};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Clone)]
pub struct StoredTransaction {
    pub user_id: String,
    pub item_id: String,
    pub row: UpsertTransaction,
}

#[derive(Debug, Default)]
pub struct StoreState {
    pub connections: Vec<Connection>,
    /// Keyed by provider transaction id, like the unique index in Postgres.
    pub transactions: HashMap<String, StoredTransaction>,
    pub cursors: HashMap<(String, String), String>,
    /// Every cursor write, for exactly-once assertions.
    pub cursor_writes: Vec<String>,
    next_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    pub state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    pub fn transaction(&self, provider_id: &str) -> Option<StoredTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(provider_id)
            .cloned()
    }

    pub fn cursor(&self, user_id: &str, item_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .cursors
            .get(&(user_id.to_string(), item_id.to_string()))
            .cloned()
    }

    pub fn cursor_writes(&self) -> Vec<String> {
        self.state.lock().unwrap().cursor_writes.clone()
    }

    pub fn connection_count(&self, user_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .connections
            .iter()
            .filter(|c| c.user_id == user_id)
            .count()
    }

    pub fn transactions_for(&self, user_id: &str, item_id: &str) -> Vec<StoredTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .values()
            .filter(|t| t.user_id == user_id && t.item_id == item_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn get_cursor(&self, user_id: &str, item_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.cursor(user_id, item_id))
    }

    async fn set_cursor(
        &self,
        user_id: &str,
        item_id: &str,
        cursor: &str,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .cursors
            .insert((user_id.to_string(), item_id.to_string()), cursor.to_string());
        state.cursor_writes.push(cursor.to_string());
        let now = Utc::now();
        if let Some(connection) = state
            .connections
            .iter_mut()
            .find(|c| c.user_id == user_id && c.item_id == item_id)
        {
            connection.sync_cursor = Some(cursor.to_string());
            connection.last_synced_at = Some(now);
        }
        Ok(())
    }

    async fn batch_upsert_transactions(
        &self,
        user_id: &str,
        item_id: &str,
        rows: &[UpsertTransaction],
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state.transactions.insert(
                row.plaid_transaction_id.clone(),
                StoredTransaction {
                    user_id: user_id.to_string(),
                    item_id: item_id.to_string(),
                    row: row.clone(),
                },
            );
        }
        Ok(())
    }

    async fn batch_delete_transactions(&self, ids: &[String]) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        for id in ids {
            state.transactions.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn upsert_connection(&self, input: &UpsertConnection) -> Result<Connection, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .connections
            .iter_mut()
            .find(|c| c.user_id == input.user_id && c.item_id == input.item_id)
        {
            existing.access_token = input.access_token.clone();
            if input.institution_name.is_some() {
                existing.institution_name = input.institution_name.clone();
            }
            if input.last_synced_at.is_some() {
                existing.last_synced_at = input.last_synced_at;
            }
            return Ok(existing.clone());
        }

        state.next_id += 1;
        let connection = Connection {
            id: state.next_id,
            user_id: input.user_id.clone(),
            item_id: input.item_id.clone(),
            access_token: input.access_token.clone(),
            institution_name: input.institution_name.clone(),
            sync_cursor: None,
            last_synced_at: input.last_synced_at,
            created_at: Utc::now(),
        };
        state.connections.push(connection.clone());
        Ok(connection)
    }

    async fn get_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<Connection>, AppError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .connections
            .iter()
            .find(|c| c.user_id == user_id && c.item_id == item_id)
            .cloned())
    }

    async fn delete_connection(
        &self,
        user_id: &str,
        item_id: &str,
    ) -> Result<Option<String>, AppError> {
        let mut state = self.state.lock().unwrap();
        let position = state
            .connections
            .iter()
            .position(|c| c.user_id == user_id && c.item_id == item_id);

        match position {
            Some(index) => {
                let connection = state.connections.remove(index);
                state
                    .transactions
                    .retain(|_, t| !(t.user_id == user_id && t.item_id == item_id));
                Ok(Some(connection.access_token))
            }
            None => Ok(None),
        }
    }
}

// =============================================================================
// Scripted provider client
// =============================================================================

pub enum PageScript {
    Page(TransactionsSyncPage),
    Fail {
        code: &'static str,
        message: &'static str,
    },
}

pub enum AccountsScript {
    Accounts(Vec<ProviderAccount>),
    Fail,
}

pub struct FakePlaid {
    pages: Mutex<VecDeque<PageScript>>,
    accounts: Mutex<AccountsScript>,
    pub exchange_item_id: String,
    pub seen_cursors: Mutex<Vec<Option<String>>>,
    pub removed_items: Mutex<Vec<String>>,
    pub fail_remove_item: AtomicBool,
    pub fail_exchange: AtomicBool,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Default for FakePlaid {
    fn default() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            accounts: Mutex::new(AccountsScript::Accounts(Vec::new())),
            exchange_item_id: "item-1".to_string(),
            seen_cursors: Mutex::new(Vec::new()),
            removed_items: Mutex::new(Vec::new()),
            fail_remove_item: AtomicBool::new(false),
            fail_exchange: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakePlaid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<PageScript>) -> Self {
        let fake = Self::default();
        *fake.pages.lock().unwrap() = pages.into();
        fake
    }

    pub fn push_page(&self, page: PageScript) {
        self.pages.lock().unwrap().push_back(page);
    }

    pub fn set_accounts(&self, script: AccountsScript) {
        *self.accounts.lock().unwrap() = script;
    }

    pub fn seen_cursors(&self) -> Vec<Option<String>> {
        self.seen_cursors.lock().unwrap().clone()
    }

    pub fn removed_items(&self) -> Vec<String> {
        self.removed_items.lock().unwrap().clone()
    }
}

fn script_error(code: &str, message: &str) -> AppError {
    if code == finance_service::services::REAUTH_ERROR_CODE {
        AppError::ReauthRequired {
            code: code.to_string(),
            message: message.to_string(),
        }
    } else {
        AppError::ProviderError {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PlaidApi for FakePlaid {
    async fn create_link_token(&self, _user_id: &str) -> Result<String, AppError> {
        Ok("link-sandbox-token".to_string())
    }

    async fn create_update_link_token(
        &self,
        _user_id: &str,
        _access_token: &str,
    ) -> Result<String, AppError> {
        Ok("link-update-token".to_string())
    }

    async fn exchange_public_token(&self, _public_token: &str) -> Result<ExchangedItem, AppError> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(script_error("INVALID_PUBLIC_TOKEN", "could not exchange"));
        }
        Ok(ExchangedItem {
            access_token: "access-sandbox-1".to_string(),
            item_id: self.exchange_item_id.clone(),
        })
    }

    async fn get_accounts(&self, _access_token: &str) -> Result<Vec<ProviderAccount>, AppError> {
        match &*self.accounts.lock().unwrap() {
            AccountsScript::Accounts(accounts) => Ok(accounts.clone()),
            AccountsScript::Fail => Err(script_error("INTERNAL_SERVER_ERROR", "accounts failed")),
        }
    }

    async fn get_balances(&self, access_token: &str) -> Result<Vec<ProviderAccount>, AppError> {
        self.get_accounts(access_token).await
    }

    async fn get_holdings(&self, _access_token: &str) -> Result<HoldingsResponse, AppError> {
        Ok(HoldingsResponse {
            accounts: Vec::new(),
            holdings: Vec::new(),
            securities: Vec::new(),
        })
    }

    async fn sync_transactions(
        &self,
        _access_token: &str,
        cursor: Option<&str>,
    ) -> Result<TransactionsSyncPage, AppError> {
        self.seen_cursors
            .lock()
            .unwrap()
            .push(cursor.map(String::from));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Widen the overlap window so racing syncs would be observable
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = self.pages.lock().unwrap().pop_front();
        match script {
            Some(PageScript::Page(page)) => Ok(page),
            Some(PageScript::Fail { code, message }) => Err(script_error(code, message)),
            // Drained script: an empty final page
            None => Ok(page(vec![], vec![], vec![], "cursor-drained", false)),
        }
    }

    async fn remove_item(&self, access_token: &str) -> Result<(), AppError> {
        self.removed_items
            .lock()
            .unwrap()
            .push(access_token.to_string());
        if self.fail_remove_item.load(Ordering::SeqCst) {
            return Err(script_error("INTERNAL_SERVER_ERROR", "revoke failed"));
        }
        Ok(())
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn page(
    added: Vec<ProviderTransaction>,
    modified: Vec<ProviderTransaction>,
    removed: Vec<&str>,
    next_cursor: &str,
    has_more: bool,
) -> TransactionsSyncPage {
    TransactionsSyncPage {
        added,
        modified,
        removed: removed
            .into_iter()
            .map(|id| RemovedTransaction {
                transaction_id: id.to_string(),
            })
            .collect(),
        next_cursor: next_cursor.to_string(),
        has_more,
    }
}

pub fn provider_txn(id: &str, account_id: &str, name: &str, amount: i64) -> ProviderTransaction {
    ProviderTransaction {
        transaction_id: id.to_string(),
        account_id: account_id.to_string(),
        name: Some(name.to_string()),
        merchant_name: None,
        amount: Decimal::from(amount),
        date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        payment_channel: Some("online".to_string()),
        personal_finance_category: None,
    }
}

pub fn provider_account(account_id: &str, name: &str) -> ProviderAccount {
    ProviderAccount {
        account_id: account_id.to_string(),
        name: Some(name.to_string()),
        official_name: None,
        account_type: Some("depository".to_string()),
        subtype: Some("checking".to_string()),
        balances: None,
    }
}
