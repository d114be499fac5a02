use axum::{extract::State, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{
    ConnectionAccountView, ConnectionView, ConnectionsResponse, ItemRequest, SuccessResponse,
};
use crate::middleware::AuthUser;
use crate::AppState;

/// List connections with live balances. A provider failure for one connection
/// degrades that entry to `status: "error"` instead of failing the call.
pub async fn list_connections(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ConnectionsResponse>, AppError> {
    let items = state.db.get_connections(&user.0.user_id).await?;
    let mut connections = Vec::with_capacity(items.len());

    for row in items {
        let (status, error_code, accounts) = match state.plaid.get_balances(&row.access_token).await
        {
            Ok(accounts) => (
                "connected",
                None,
                accounts
                    .into_iter()
                    .map(|acc| {
                        let balances = acc.balances.clone();
                        ConnectionAccountView {
                            account_id: acc.account_id,
                            name: acc.name,
                            account_type: acc.account_type,
                            subtype: acc.subtype,
                            current: balances.as_ref().and_then(|b| b.current),
                            available: balances.as_ref().and_then(|b| b.available),
                        }
                    })
                    .collect(),
            ),
            Err(err) => {
                tracing::warn!(item_id = %row.item_id, error = %err, "Balance fetch failed for connection");
                ("error", provider_error_code(&err), Vec::new())
            }
        };

        connections.push(ConnectionView {
            id: row.id,
            item_id: row.item_id,
            institution_name: row
                .institution_name
                .unwrap_or_else(|| "Unknown".to_string()),
            status,
            error_code,
            last_synced_at: row.last_synced_at,
            accounts,
        });
    }

    Ok(Json(ConnectionsResponse { connections }))
}

/// Re-sync transactions for one connection. A reauth-required provider state
/// surfaces with its distinguished error code so the caller can prompt the
/// reconnect flow.
pub async fn refresh(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ItemRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    req.validate()?;

    state
        .connections
        .refresh(&user.0.user_id, &req.item_id)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// Remove a connection and all its local data, then revoke the credential.
pub async fn disconnect(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ItemRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    req.validate()?;

    state
        .connections
        .disconnect(&user.0.user_id, &req.item_id)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}

/// Machine-readable code for a degraded connection entry.
pub(crate) fn provider_error_code(err: &AppError) -> Option<String> {
    match err {
        AppError::ProviderError { code, .. } | AppError::ReauthRequired { code, .. } => {
            Some(code.clone())
        }
        AppError::ProviderTimeout(_) => Some("PROVIDER_TIMEOUT".to_string()),
        _ => None,
    }
}
