use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use cardwall_types::models::UserIdentity;

use crate::auth::{AppState, AppStateInner, load_user};
use crate::error::ApiError;

/// Resolve an `Authorization` header value to the user it belongs to.
///
/// Fails with `Unauthorized` for a missing header, a scheme other than `Bearer`, a token that
/// does not verify, or a token whose user no longer exists.
pub async fn authenticate(
    state: &AppStateInner,
    auth_header: Option<&str>,
) -> Result<UserIdentity, ApiError> {
    let token = auth_header
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.contains(' '))
        .ok_or(ApiError::Unauthorized)?;

    let user_id = state.auth.verify_token(token).ok_or(ApiError::Unauthorized)?;
    let user = load_user(state, &user_id).await?;

    Ok(UserIdentity {
        id: user.id,
        login: user.login,
    })
}

fn auth_header(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Reject the request unless it carries a valid bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = auth_header(&req);
    let identity = authenticate(&state, header.as_deref()).await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Attach the caller's identity when a valid token is present; stay anonymous otherwise.
pub async fn optional_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(header) = auth_header(&req) {
        match authenticate(&state, Some(&header)).await {
            Ok(identity) => {
                req.extensions_mut().insert(identity);
            }
            Err(e) => debug!("Ignoring unusable credentials on public route: {}", e),
        }
    }
    next.run(req).await
}
