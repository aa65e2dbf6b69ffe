/// Request authentication and ownership enforcement
use crate::{
    auth::tokens::{subject_id, TokenIssuer},
    db::{
        models::{from_document, Account},
        Collection, DocumentStore, ObjectId,
    },
    error::{ApiError, ApiResult, AuthFailure},
};
use std::sync::Arc;

pub struct AuthGuard {
    store: Arc<dyn DocumentStore>,
    issuer: Arc<TokenIssuer>,
}

impl AuthGuard {
    pub fn new(store: Arc<dyn DocumentStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    /// Resolve an access token to its account.
    ///
    /// Access tokens are self-contained: the stored refresh token is never
    /// consulted, so a revoked session keeps working until the token expires.
    pub async fn authenticate(&self, token: Option<&str>) -> ApiResult<Account> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized(AuthFailure::MissingToken))?;

        let claims = self
            .issuer
            .verify_access_token(token)
            .map_err(ApiError::Unauthorized)?;
        let account_id = subject_id(&claims.sub).map_err(ApiError::Unauthorized)?;

        let doc = self
            .store
            .find_by_id(Collection::Users, &account_id)
            .await?
            .ok_or(ApiError::Unauthorized(AuthFailure::AccountMissing))?;

        Ok(from_document(doc)?)
    }
}

/// Fail with `Forbidden` unless the caller owns the entity
pub fn require_ownership(owner: &ObjectId, caller: &ObjectId, action: &str) -> ApiResult<()> {
    if owner == caller {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!("Only the owner can {}", action)))
    }
}
