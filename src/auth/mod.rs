/// Authentication: password hashing, token minting, session state, and the
/// request extractors that resolve a caller to an account

pub mod guard;
pub mod password;
pub mod session;
pub mod tokens;

pub use guard::{require_ownership, AuthGuard};
pub use password::PasswordHasher;
pub use session::SessionStore;
pub use tokens::{TokenIssuer, TokenPair};

use crate::{
    api::middleware::extract_access_token,
    context::AppContext,
    db::{models::Account, ObjectId},
    error::ApiError,
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - resolves the request's access token to an account
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
}

impl AuthContext {
    pub fn account_id(&self) -> &ObjectId {
        &self.account.id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let token = extract_access_token(&parts.headers);
        let account = state.auth_guard.authenticate(token.as_deref()).await?;

        Ok(AuthContext { account })
    }
}

/// Optional authenticated context - an absent or invalid token means anonymous
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn viewer_id(&self) -> Option<ObjectId> {
        self.auth.as_ref().map(|auth| auth.account.id)
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppContext) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_access_token(&parts.headers) else {
            return Ok(OptionalAuthContext { auth: None });
        };

        let auth = match state.auth_guard.authenticate(Some(&token)).await {
            Ok(account) => Some(AuthContext { account }),
            Err(ApiError::Unauthorized(cause)) => {
                tracing::debug!(%cause, "Ignoring invalid token on public route");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(OptionalAuthContext { auth })
    }
}
