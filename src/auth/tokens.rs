/// Access and refresh token minting
///
/// Both token kinds are HS256 JWTs, signed with distinct secrets. Every token
/// carries `iat`, `exp` and a random `jti`, so no two are byte-identical.
use crate::{
    config::AuthConfig,
    db::{models::Account, ObjectId},
    error::{ApiError, ApiResult, AuthFailure},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Claims of a short-lived access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Claims of a long-lived refresh token; identity only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Freshly minted credential pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKeys::from_secret(&config.access_token_secret),
            refresh: SigningKeys::from_secret(&config.refresh_token_secret),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days),
            validation,
        }
    }

    pub fn issue_access_token(&self, account: &Account) -> ApiResult<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account.id.to_hex(),
            email: account.email.clone(),
            username: account.username.clone(),
            full_name: account.full_name.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        sign(&claims, &self.access.encoding)
    }

    pub fn issue_refresh_token(&self, account_id: &ObjectId) -> ApiResult<String> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sub: account_id.to_hex(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        sign(&claims, &self.refresh.encoding)
    }

    pub fn issue_pair(&self, account: &Account) -> ApiResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(account)?,
            refresh_token: self.issue_refresh_token(&account.id)?,
        })
    }

    /// Verify signature and expiry of an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthFailure> {
        self.verify(token, &self.access.decoding)
    }

    /// Verify signature and expiry of a refresh token
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthFailure> {
        self.verify(token, &self.refresh.decoding)
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, key: &DecodingKey) -> Result<T, AuthFailure> {
        decode::<T>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT verification failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthFailure::Expired,
                    ErrorKind::InvalidSignature => AuthFailure::BadSignature,
                    _ => AuthFailure::MalformedToken,
                }
            })
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> ApiResult<String> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| ApiError::Internal(format!("Token signing failed: {}", e)))
}

/// Account id carried in a token subject
pub fn subject_id(sub: &str) -> Result<ObjectId, AuthFailure> {
    sub.parse().map_err(|_| AuthFailure::MalformedToken)
}
