//! Transaction model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

/// A synced transaction. `plaid_transaction_id` is globally unique and is the
/// idempotency key for merges and the target of removals.
///
/// Amount sign convention follows the provider: positive = money leaving the
/// account (spend), negative = credit/refund/inflow.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub item_id: String,
    pub account_id: String,
    pub plaid_transaction_id: String,
    pub name: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub account_name: Option<String>,
    pub payment_channel: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row of a sync merge batch. Added and modified provider transactions
/// both reduce to this shape; the upsert is keyed by `plaid_transaction_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertTransaction {
    pub account_id: String,
    pub plaid_transaction_id: String,
    pub name: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub account_name: Option<String>,
    pub payment_channel: Option<String>,
    pub category: Option<String>,
}
