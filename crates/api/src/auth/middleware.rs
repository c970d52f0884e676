//! Session and role gates for protected routes
//!
//! `require_session` runs first and leaves a `Principal` in the request
//! extensions. An expired or missing access token is exchanged through the
//! refresh token, and the replacement pair is written onto the response.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use eventhub_shared::Role;

use super::principal::Principal;
use super::tokens::TokenError;
use super::transport::SessionTokens;
use crate::error::ApiError;
use crate::state::AppState;

/// Middleware that requires a valid session
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let SessionTokens { access, refresh } = state.transport.extract(request.headers());

    let Some(refresh) = refresh else {
        tracing::warn!(path = %path, has_access = access.is_some(), "require_session: no refresh token");
        return ApiError::unauthorized().into_response();
    };

    if let Some(token) = access.as_deref() {
        match state.tokens.verify_access(token) {
            Ok(principal) => {
                request.extensions_mut().insert(principal);
                return next.run(request).await;
            }
            Err(_) => {
                tracing::debug!(path = %path, "require_session: access token rejected, rotating");
            }
        }
    }

    let current = access
        .as_deref()
        .and_then(|token| state.tokens.decode_access_ignoring_expiry(token));

    match state.tokens.rotate(&refresh, current.as_ref()).await {
        Ok((pair, principal)) => {
            tracing::info!(
                path = %path,
                user_id = %principal.user_id,
                "require_session: session rotated"
            );
            request.extensions_mut().insert(principal);
            let mut response = next.run(request).await;
            state.transport.attach(response.headers_mut(), &pair);
            response
        }
        Err(TokenError::Store(e)) => ApiError::from(e).into_response(),
        Err(TokenError::Signing(e)) => ApiError::internal(e).into_response(),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "require_session: rotation failed");
            ApiError::unauthorized().into_response()
        }
    }
}

/// Middleware that requires the session principal to hold `role`.
/// Must run after `require_session`.
pub async fn require_role(role: Role, request: Request, next: Next) -> Response {
    match request.extensions().get::<Principal>() {
        Some(principal) if principal.role == role => next.run(request).await,
        Some(principal) => {
            tracing::warn!(
                user_id = %principal.user_id,
                role = %principal.role,
                required = %role,
                "require_role: insufficient role"
            );
            ApiError::unauthorized().into_response()
        }
        None => {
            tracing::warn!("require_role: no session principal");
            ApiError::unauthorized().into_response()
        }
    }
}

pub async fn require_organizer(request: Request, next: Next) -> Response {
    require_role(Role::Organizer, request, next).await
}

pub async fn require_user(request: Request, next: Next) -> Response {
    require_role(Role::User, request, next).await
}
