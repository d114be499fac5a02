use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::AppState;

/// Identity of the verified caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: String,
}

/// Middleware to require a bearer token from the identity provider.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = token.ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let user_id = state.verifier.verify(token).await?;

    // Handlers read the caller identity from request extensions
    req.extensions_mut().insert(CurrentUser { user_id });

    Ok(next.run(req).await)
}

/// Extractor for the verified caller in handlers.
pub struct AuthUser(pub CurrentUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts.extensions.get::<CurrentUser>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Caller identity missing from request extensions"
            ))
        })?;

        Ok(AuthUser(user.clone()))
    }
}
