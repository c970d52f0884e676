//! Password and one-time-code hashing with Argon2id

use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashParams {
    /// 19 MiB, 2 iterations, 1 lane
    fn default() -> Self {
        Self {
            memory_kib: 19456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hashing parameters: {0}")]
    Params(String),

    #[error("hashing failed: {0}")]
    Hash(String),

    #[error("hashing task failed: {0}")]
    Task(String),
}

/// Salted, cost-factored hashing for passwords and OTP codes
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    dummy_hash: Arc<str>,
}

impl CredentialHasher {
    pub fn new(params: PasswordHashParams) -> Result<Self, HashError> {
        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            None,
        )
        .map_err(|e| HashError::Params(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        // Hash of 32 random bytes nobody knows, so verifying against it always fails
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(&secret, &salt)
            .map_err(|e| HashError::Hash(e.to_string()))?
            .to_string();

        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash with a fresh salt; two calls on the same input differ
    pub fn hash(&self, secret: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    /// False on mismatch and on a malformed hash
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            tracing::warn!("Stored hash could not be parsed");
            return false;
        };
        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    /// A valid hash no submitted secret will match
    pub fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }

    pub async fn hash_async(&self, secret: &str) -> Result<String, HashError> {
        let hasher = self.clone();
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(|e| HashError::Task(e.to_string()))?
    }

    pub async fn verify_async(&self, secret: &str, hash: &str) -> bool {
        let hasher = self.clone();
        let secret = secret.to_string();
        let hash = hash.to_string();
        match tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash)).await {
            Ok(matched) => matched,
            Err(e) => {
                tracing::error!(error = %e, "Hash verification task failed");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn fast_params() -> PasswordHashParams {
    PasswordHashParams {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    }
}
