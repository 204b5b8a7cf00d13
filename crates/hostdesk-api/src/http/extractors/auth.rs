//! Portal token authentication extractor.
//!
//! Extracts and resolves portal tokens from:
//! - `Authorization: Bearer <token>` header (REST clients)
//! - `?token=<token>` query parameter (WebSocket upgrades, where browsers
//!   cannot set headers)
//!
//! Resolution goes through the [`IdentityProvider`] port -- the boundary
//! to the portal's authentication subsystem.
//!
//! [`IdentityProvider`]: hostdesk_core::identity::IdentityProvider

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use hostdesk_core::identity::IdentityProvider;
use hostdesk_types::identity::Identity;

use crate::http::error::AppError;
use crate::state::AppState;

/// Authenticated request marker carrying the resolved identity.
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;

        let identity = state
            .identity
            .resolve(&token)
            .await
            .map_err(|_| AppError::Unauthorized("Invalid or expired portal token".to_string()))?;

        Ok(Authenticated(identity))
    }
}

/// Extract the portal token from the request.
fn extract_token(parts: &Parts) -> Result<String, AppError> {
    // Try Authorization: Bearer <token>
    if let Some(auth) = parts.headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    // Try ?token=<token> (WebSocket upgrade path)
    if let Some(query) = parts.uri.query() {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                if !token.is_empty() {
                    return Ok(token.to_string());
                }
            }
        }
    }

    Err(AppError::Unauthorized(
        "Missing portal token. Provide via 'Authorization: Bearer <token>' header or 'token' query parameter.".to_string(),
    ))
}
