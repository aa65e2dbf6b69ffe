/// Password hashing and verification
use crate::{
    config::AuthConfig,
    error::{ApiError, ApiResult},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Argon2id hasher with a work factor fixed at construction
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32) -> ApiResult<Self> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| ApiError::Config(format!("Invalid password hashing parameters: {}", e)))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &AuthConfig) -> ApiResult<Self> {
        Self::new(config.password_memory_kib, config.password_iterations)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a plaintext secret with a fresh random salt
    pub fn hash(&self, plaintext: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();
        Ok(hash)
    }

    /// Check a plaintext secret against a stored hash.
    ///
    /// A mismatch, or a stored value that is not a valid hash, is `false`.
    /// The parameters embedded in the stored hash are the ones used.
    pub fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        let parsed = match PasswordHash::new(stored_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password hash is unreadable: {}", e);
                return false;
            }
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
