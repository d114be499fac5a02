use axum::{extract::State, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::{ExchangeTokenRequest, ItemRequest, LinkTokenResponse, SuccessResponse};
use crate::middleware::AuthUser;
use crate::AppState;

/// Create a link-initialization token for connecting a new institution.
pub async fn create_link_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LinkTokenResponse>, AppError> {
    let link_token = state.plaid.create_link_token(&user.0.user_id).await?;
    Ok(Json(LinkTokenResponse { link_token }))
}

/// Exchange a public token and store the new connection. The initial sync is
/// non-blocking: the link succeeds once the connection is durable.
pub async fn exchange_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ExchangeTokenRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    req.validate()?;

    let outcome = state
        .connections
        .link(&user.0.user_id, &req.public_token, req.institution_name)
        .await?;

    tracing::info!(
        item_id = %outcome.item_id,
        initial_synced = outcome.initial_sync.is_some(),
        "Connection linked"
    );

    Ok(Json(SuccessResponse::ok()))
}

/// Create an update-mode link token for reconnecting an existing item.
pub async fn create_update_link_token(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ItemRequest>,
) -> Result<Json<LinkTokenResponse>, AppError> {
    req.validate()?;

    let link_token = state
        .connections
        .update_link_token(&user.0.user_id, &req.item_id)
        .await?;

    Ok(Json(LinkTokenResponse { link_token }))
}
