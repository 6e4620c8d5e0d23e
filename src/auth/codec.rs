//! Token generation and hashing for magic links.
//!
//! Tokens are 36 random bytes encoded as base64url (48 characters). Only an
//! Argon2id hash of the token is ever persisted.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;

use super::error::{AuthError, AuthResult};

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 36;
/// Length of the encoded token.
pub const TOKEN_LENGTH: usize = 48;

const SALT_BYTES: usize = 16;

/// Generates, hashes and verifies magic-link tokens.
#[derive(Clone)]
pub struct TokenCodec {
    argon2: Argon2<'static>,
}

impl TokenCodec {
    /// Codec with the library's recommended Argon2id parameters.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Codec with explicit Argon2id cost parameters.
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> AuthResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AuthError::Internal(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Returns a fresh random token.
    pub fn generate(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill(&mut bytes[..]);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Hashes a token into a salted PHC string.
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        rand::rng().fill(&mut salt_bytes[..]);
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::Internal(format!("failed to encode salt: {}", e)))?;

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("failed to hash token: {}", e)))
    }

    /// Checks a token against a stored hash in constant time.
    ///
    /// A malformed stored hash never verifies.
    pub fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(plaintext.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!("Stored token hash is malformed: {}", e);
                false
            }
        }
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    pub async fn hash_in_background(&self, plaintext: String) -> AuthResult<String> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_in_background(
        &self,
        plaintext: String,
        stored_hash: String,
    ) -> AuthResult<bool> {
        let codec = self.clone();
        tokio::task::spawn_blocking(move || codec.verify(&plaintext, &stored_hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {}", e)))
    }
}

impl Default for TokenCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn test_codec() -> TokenCodec {
    TokenCodec::with_params(8, 1, 1).unwrap()
}
