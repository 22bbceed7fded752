// ViewerContext Middleware - resolves the bearer token into a request-scoped viewer
// Missing credentials yield an anonymous viewer; a bad token is rejected outright.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::auth_store::AuthStore;
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::viewer::ViewerContext;
use crate::models::UserRole;

/// Application state able to resolve viewers
pub trait HasViewerResolver {
    fn auth_store(&self) -> &AuthStore;
    fn database(&self) -> &Arc<dyn DatabaseInterface>;
}

pub async fn viewer_context_middleware<T>(
    State(app_state): State<T>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError>
where
    T: HasViewerResolver + Clone + Send + Sync + 'static,
{
    let request_id = format!("req-{}", Uuid::new_v4());
    let viewer_context = match bearer_token(request.headers())? {
        Some(token) => resolve_viewer(&app_state, token, request_id).await?,
        None => ViewerContext::anonymous(request_id),
    };

    debug!(request_id = %viewer_context.request_id, user_id = ?viewer_context.user_id, "viewer resolved");
    request.extensions_mut().insert(Arc::new(viewer_context));

    Ok(next.run(request).await)
}

/// Token from an `Authorization: Bearer` header, if any
pub fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed authorization header".to_string()))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(Some(token.trim())),
        _ => Err(AppError::Unauthorized(
            "Expected a bearer token".to_string(),
        )),
    }
}

async fn resolve_viewer<T: HasViewerResolver>(
    app_state: &T,
    token: &str,
    request_id: String,
) -> AppResult<ViewerContext> {
    let user = app_state
        .auth_store()
        .user_for_token(token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    // A user whose profile row is gone still authenticates with the default role
    let role = app_state
        .database()
        .get_profile(user.id)
        .await?
        .map(|profile| profile.role)
        .unwrap_or(UserRole::User);

    Ok(ViewerContext::authenticated(user.id, role, request_id))
}
