//! Request and response bodies for the HTTP surface.

use crate::services::SpendingBucket;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Serialize)]
pub struct LinkTokenResponse {
    pub link_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExchangeTokenRequest {
    #[validate(length(min = 1, message = "public_token is required"))]
    pub public_token: String,
    pub institution_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ItemRequest {
    #[validate(length(min = 1, message = "item_id is required"))]
    pub item_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionView>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionView {
    pub id: i64,
    pub item_id: String,
    pub institution_name: String,
    /// `"connected"` or `"error"`; a failed balance fetch degrades only this
    /// entry, never the whole listing.
    pub status: &'static str,
    pub error_code: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub accounts: Vec<ConnectionAccountView>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionAccountView {
    pub account_id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub current: Option<Decimal>,
    pub available: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<TransactionView>,
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: i64,
    pub plaid_transaction_id: String,
    pub name: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub account_name: String,
    pub account_id: String,
    pub item_id: String,
    pub payment_channel: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountSummaryView>,
}

#[derive(Debug, Serialize)]
pub struct AccountSummaryView {
    pub item_id: String,
    pub institution_name: String,
    pub account_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub subtype: Option<String>,
    pub current: Option<Decimal>,
    pub available: Option<Decimal>,
    pub currency: String,
}

#[derive(Debug, Serialize)]
pub struct InvestmentsResponse {
    pub holdings: Vec<HoldingView>,
}

#[derive(Debug, Serialize)]
pub struct HoldingView {
    pub item_id: String,
    pub institution_name: String,
    pub account_name: String,
    pub security_name: String,
    pub ticker: Option<String>,
    pub security_type: Option<String>,
    pub quantity: Decimal,
    pub close_price: Option<Decimal>,
    pub value: Decimal,
    pub cost_basis: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct SpendingQuery {
    pub period: Option<String>,
    /// Comma-separated item ids; absent means all connections.
    pub item_ids: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SpendingSummaryResponse {
    pub buckets: Vec<SpendingBucket>,
}
