use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::{AccountSummaryView, AccountsResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// All accounts with balances across every connection. A provider failure for
/// one connection skips its accounts; the rest of the aggregation succeeds.
pub async fn list_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountsResponse>, AppError> {
    let items = state.db.get_connections(&user.0.user_id).await?;
    let mut accounts = Vec::new();

    for row in items {
        let institution_name = row
            .institution_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        match state.plaid.get_balances(&row.access_token).await {
            Ok(provider_accounts) => {
                for acc in provider_accounts {
                    let name = acc.display_name();
                    let balances = acc.balances;
                    accounts.push(AccountSummaryView {
                        item_id: row.item_id.clone(),
                        institution_name: institution_name.clone(),
                        account_id: acc.account_id,
                        name,
                        account_type: acc.account_type,
                        subtype: acc.subtype,
                        current: balances.as_ref().and_then(|b| b.current),
                        available: balances.as_ref().and_then(|b| b.available),
                        currency: balances
                            .and_then(|b| b.iso_currency_code)
                            .unwrap_or_else(|| "USD".to_string()),
                    });
                }
            }
            Err(err) => {
                tracing::warn!(item_id = %row.item_id, error = %err, "Accounts fetch failed for connection");
            }
        }
    }

    Ok(Json(AccountsResponse { accounts }))
}
