use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::routes::AppState;
use crate::services::users;

/// Identity attached by [`optional_auth`]. `None` means anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Resolve a bearer token to a stored user. Every failure, whether a missing
/// header, a bad signature, an expired token or a deleted user, is the same
/// `Unauthenticated` to the caller.
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let Authorization(bearer) = headers
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthenticated)?;

    let user_id = state.tokens.verify(bearer.token()).map_err(|e| {
        tracing::debug!("Rejected bearer token: {e}");
        AppError::Unauthenticated
    })?;

    users::find_by_id(&state.db, &user_id)?.ok_or_else(|| {
        tracing::debug!(%user_id, "Bearer token names an unknown user");
        AppError::Unauthenticated
    })
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = authenticate(&state, request.headers())?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Like [`require_auth`] but never rejects: an absent or unusable token
/// proceeds as anonymous. Store failures still surface as errors.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match authenticate(&state, request.headers()) {
        Ok(user) => Some(user),
        Err(AppError::Unauthenticated) => None,
        Err(e) => return Err(e),
    };

    request.extensions_mut().insert(MaybeUser(user));
    Ok(next.run(request).await)
}
