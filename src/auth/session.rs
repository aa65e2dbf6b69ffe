/// Refresh-token session state
///
/// Each account holds at most one valid refresh token, stored verbatim on the
/// account document. Every write to it is a single conditional update.
use crate::{
    auth::tokens::{subject_id, TokenIssuer, TokenPair},
    db::{
        models::{from_document, Account},
        Collection, DocumentStore, Filter, ObjectId, UpdateOp,
    },
    error::{ApiError, ApiResult, AuthFailure},
};
use std::sync::Arc;

const REFRESH_TOKEN_FIELD: &str = "refreshToken";

pub struct SessionStore {
    store: Arc<dyn DocumentStore>,
    issuer: Arc<TokenIssuer>,
}

/// Byte comparison that does not exit early on the first difference
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl SessionStore {
    pub fn new(store: Arc<dyn DocumentStore>, issuer: Arc<TokenIssuer>) -> Self {
        Self { store, issuer }
    }

    async fn load_account(&self, account_id: &ObjectId) -> ApiResult<Option<Account>> {
        match self.store.find_by_id(Collection::Users, account_id).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Mint a new pair and make its refresh token the only valid one
    pub async fn rotate(&self, account_id: &ObjectId) -> ApiResult<TokenPair> {
        let account = self
            .load_account(account_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

        let pair = self.issuer.issue_pair(&account)?;
        let stored = self
            .store
            .update_by_id(
                Collection::Users,
                account_id,
                &[UpdateOp::set(REFRESH_TOKEN_FIELD, pair.refresh_token.as_str())],
            )
            .await?;

        if stored.is_none() {
            return Err(ApiError::NotFound("User does not exist".to_string()));
        }

        tracing::info!(account = %account_id, "Session rotated");
        Ok(pair)
    }

    /// Resolve a presented refresh token to the account it is currently valid for
    pub async fn validate_refresh(&self, presented: &str) -> ApiResult<ObjectId> {
        let claims = self
            .issuer
            .verify_refresh_token(presented)
            .map_err(ApiError::Unauthorized)?;
        let account_id = subject_id(&claims.sub).map_err(ApiError::Unauthorized)?;

        let account = self
            .load_account(&account_id)
            .await?
            .ok_or(ApiError::Unauthorized(AuthFailure::AccountMissing))?;

        match account.refresh_token.as_deref() {
            None => Err(ApiError::Unauthorized(AuthFailure::Revoked)),
            Some(current) if constant_time_eq(current.as_bytes(), presented.as_bytes()) => Ok(account_id),
            Some(_) => Err(ApiError::Unauthorized(AuthFailure::TokenMismatch)),
        }
    }

    /// Trade a valid refresh token for a new pair.
    ///
    /// The stored token is swapped only if it still equals the presented one,
    /// so of two concurrent exchanges of the same token exactly one wins.
    pub async fn exchange(&self, presented: &str) -> ApiResult<(Account, TokenPair)> {
        let account_id = self.validate_refresh(presented).await?;
        let account = self
            .load_account(&account_id)
            .await?
            .ok_or(ApiError::Unauthorized(AuthFailure::AccountMissing))?;

        let pair = self.issuer.issue_pair(&account)?;
        let swapped = self
            .store
            .update_one(
                Collection::Users,
                &Filter::all_of(vec![
                    Filter::id(&account_id),
                    Filter::eq(REFRESH_TOKEN_FIELD, presented),
                ]),
                &[UpdateOp::set(REFRESH_TOKEN_FIELD, pair.refresh_token.as_str())],
            )
            .await?;

        match swapped {
            Some(_) => {
                tracing::info!(account = %account_id, "Refresh token exchanged");
                Ok((account, pair))
            }
            None => Err(ApiError::Unauthorized(AuthFailure::TokenMismatch)),
        }
    }

    /// Clear the stored refresh token
    pub async fn revoke(&self, account_id: &ObjectId) -> ApiResult<()> {
        self.store
            .update_by_id(
                Collection::Users,
                account_id,
                &[UpdateOp::Unset(REFRESH_TOKEN_FIELD.to_string())],
            )
            .await?;

        tracing::info!(account = %account_id, "Session revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        db::{Document, SqliteDocumentStore},
    };
    use serde_json::json;
    use std::path::PathBuf;

    async fn setup() -> (SessionStore, Arc<dyn DocumentStore>, ObjectId) {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().await.unwrap());
        let config = ServerConfig::for_testing(PathBuf::from("./data"));
        let issuer = Arc::new(TokenIssuer::new(&config.authentication));

        let doc = match json!({
            "username": "ana",
            "email": "ana@example.com",
            "fullName": "Ana",
            "avatar": "a.png",
            "watchHistory": [],
            "password": "hash",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let created: Document = store.create(Collection::Users, doc).await.unwrap();
        let id = created["_id"].as_str().unwrap().parse().unwrap();

        (SessionStore::new(Arc::clone(&store), issuer), store, id)
    }

    #[tokio::test]
    async fn test_rotation_invalidates_previous_token() {
        let (sessions, _, id) = setup().await;

        let first = sessions.rotate(&id).await.unwrap();
        assert_eq!(sessions.validate_refresh(&first.refresh_token).await.unwrap(), id);

        let second = sessions.rotate(&id).await.unwrap();
        assert!(matches!(
            sessions.validate_refresh(&first.refresh_token).await,
            Err(ApiError::Unauthorized(AuthFailure::TokenMismatch))
        ));
        assert_eq!(sessions.validate_refresh(&second.refresh_token).await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_revoke_blocks_last_token() {
        let (sessions, _, id) = setup().await;
        let pair = sessions.rotate(&id).await.unwrap();

        sessions.revoke(&id).await.unwrap();

        assert!(matches!(
            sessions.validate_refresh(&pair.refresh_token).await,
            Err(ApiError::Unauthorized(AuthFailure::Revoked))
        ));
    }

    #[tokio::test]
    async fn test_exchange_is_single_use() {
        let (sessions, _, id) = setup().await;
        let pair = sessions.rotate(&id).await.unwrap();

        let (account, next) = sessions.exchange(&pair.refresh_token).await.unwrap();
        assert_eq!(account.id, id);
        assert_ne!(next.refresh_token, pair.refresh_token);

        assert!(matches!(
            sessions.exchange(&pair.refresh_token).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(sessions.exchange(&next.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotate_missing_account() {
        let (sessions, _, _) = setup().await;
        assert!(matches!(sessions.rotate(&ObjectId::new()).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deleted_account_cannot_refresh() {
        let (sessions, store, id) = setup().await;
        let pair = sessions.rotate(&id).await.unwrap();
        store.delete_by_id(Collection::Users, &id).await.unwrap();

        assert!(matches!(
            sessions.validate_refresh(&pair.refresh_token).await,
            Err(ApiError::Unauthorized(AuthFailure::AccountMissing))
        ));
    }

    #[tokio::test]
    async fn test_forged_token_rejected() {
        let (sessions, _, _) = setup().await;
        assert!(matches!(
            sessions.validate_refresh("forged.token.value").await,
            Err(ApiError::Unauthorized(AuthFailure::MalformedToken))
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
