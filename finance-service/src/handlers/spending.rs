use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::dtos::{SpendingQuery, SpendingSummaryResponse};
use crate::middleware::AuthUser;
use crate::services::{bucket_spending, SummaryPeriod};
use crate::AppState;

/// Bucketed spending totals over the requested window, optionally filtered to
/// a subset of connections.
pub async fn spending_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SpendingQuery>,
) -> Result<Json<SpendingSummaryResponse>, AppError> {
    let period = SummaryPeriod::parse(query.period.as_deref().unwrap_or("week")).ok_or_else(
        || AppError::BadRequest(anyhow::anyhow!("Invalid period; expected week, month, or year")),
    )?;

    let item_ids: Option<Vec<String>> = query
        .item_ids
        .map(|ids| {
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(String::from)
                .collect::<Vec<_>>()
        })
        .filter(|ids| !ids.is_empty());

    let today = Utc::now().date_naive();
    let since = period.window_start(today);

    let rows = state
        .db
        .get_spending_transactions(&user.0.user_id, item_ids.as_deref(), since)
        .await?;

    let buckets = bucket_spending(&rows, period, today);

    Ok(Json(SpendingSummaryResponse { buckets }))
}
