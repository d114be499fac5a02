use axum::{extract::State, Json};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;

use crate::dtos::{HoldingView, InvestmentsResponse};
use crate::middleware::AuthUser;
use crate::services::NO_HOLDINGS_ERROR_CODES;
use crate::AppState;

/// Holdings across all connected investment accounts. Connections without
/// investment products are skipped silently; other per-connection failures
/// are logged and skipped.
pub async fn list_holdings(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<InvestmentsResponse>, AppError> {
    let items = state.db.get_connections(&user.0.user_id).await?;
    let mut holdings = Vec::new();

    for row in items {
        let institution_name = row
            .institution_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        let response = match state.plaid.get_holdings(&row.access_token).await {
            Ok(response) => response,
            Err(AppError::ProviderError { code, .. })
                if NO_HOLDINGS_ERROR_CODES.contains(&code.as_str()) =>
            {
                continue;
            }
            Err(err) => {
                tracing::warn!(item_id = %row.item_id, error = %err, "Holdings fetch failed for connection");
                continue;
            }
        };

        let account_names: HashMap<String, String> = response
            .accounts
            .iter()
            .map(|a| (a.account_id.clone(), a.display_name()))
            .collect();

        let securities: HashMap<String, &crate::models::ProviderSecurity> = response
            .securities
            .iter()
            .map(|s| (s.security_id.clone(), s))
            .collect();

        for holding in &response.holdings {
            let security = securities.get(&holding.security_id);
            let quantity = holding.quantity.unwrap_or(Decimal::ZERO);
            let close_price = security.and_then(|s| s.close_price);
            let value = holding
                .institution_value
                .unwrap_or_else(|| quantity * close_price.unwrap_or(Decimal::ZERO));

            holdings.push(HoldingView {
                item_id: row.item_id.clone(),
                institution_name: institution_name.clone(),
                account_name: account_names
                    .get(&holding.account_id)
                    .cloned()
                    .unwrap_or_else(|| "Account".to_string()),
                security_name: security
                    .and_then(|s| s.name.clone())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "Unknown Security".to_string()),
                ticker: security.and_then(|s| s.ticker_symbol.clone()),
                security_type: security.and_then(|s| s.security_type.clone()),
                quantity,
                close_price,
                value,
                cost_basis: holding.cost_basis,
            });
        }
    }

    Ok(Json(InvestmentsResponse { holdings }))
}
