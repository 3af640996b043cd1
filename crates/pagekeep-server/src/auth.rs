//! Bearer-token extractor for the `/api` routes.

use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts};
use pagekeep_shared::constants::ROLE_AUTHENTICATED;
use pagekeep_shared::Identity;

use crate::api::AppState;
use crate::error::ServerError;
use crate::verifier::Claims;

/// Caller whose token passed verification.
///
/// Every failure (no header, wrong scheme, bad token) rejects with the same
/// [`ServerError::Unauthenticated`]; the reason is only logged.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Identity the store runs this caller's statements as.
    pub fn identity(&self) -> Identity {
        let role = self.0.role.as_deref().unwrap_or(ROLE_AUTHENTICATED);
        Identity::new(self.0.sub.clone(), role)
    }

    pub fn email(&self) -> &str {
        &self.0.email
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                tracing::debug!("missing bearer token");
                ServerError::Unauthenticated
            })?;

        let claims = state.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            ServerError::Unauthenticated
        })?;

        Ok(AuthUser(claims))
    }
}
