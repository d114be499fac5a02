use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{TransactionView, TransactionsQuery, TransactionsResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// Recent transactions across all of the caller's connections, newest first.
/// `limit` defaults to 25 and is capped at 100.
pub async fn recent_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let limit = effective_limit(query.limit);

    let rows = state
        .db
        .get_recent_transactions(&user.0.user_id, limit)
        .await?;

    let transactions = rows
        .into_iter()
        .map(|t| TransactionView {
            id: t.id,
            plaid_transaction_id: t.plaid_transaction_id,
            name: t.name,
            amount: t.amount,
            date: t.date,
            account_name: t.account_name.unwrap_or_else(|| "Account".to_string()),
            account_id: t.account_id,
            item_id: t.item_id,
            payment_channel: t.payment_channel,
            category: t.category,
        })
        .collect();

    Ok(Json(TransactionsResponse { transactions }))
}

fn effective_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(25).clamp(1, 100)
}
