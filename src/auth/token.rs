use crate::config::AuthConfig;
use crate::error::{AppError, AuthError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Algorithm, Argon2, Params, Version,
};
use sha2::{Digest, Sha256};

/// Length of every generated token: hex-encoded SHA-256.
pub const TOKEN_LENGTH: usize = 64;

/// Anything that can mint a token for an encoded identifier.
#[cfg_attr(test, mockall::automock)]
pub trait TokenSource: Send + Sync {
    fn generate(&self, encoded_user: &str) -> Result<String, AuthError>;
}

/// Mints opaque session tokens.
///
/// The encoded identifier is hashed with Argon2id under a fresh salt, and
/// the PHC string is then digested with SHA-256. Two calls for the same
/// identifier yield different tokens.
#[derive(Debug, Clone)]
pub struct TokenGenerator {
    params: Params,
}

impl TokenGenerator {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::ConfigError(format!("Invalid token hash parameters: {}", e)))?;
        Ok(Self { params })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AppError> {
        Self::new(config.hash_memory_kib, config.hash_iterations, config.hash_parallelism)
    }

    pub fn generate(&self, encoded_user: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());

        let hash = argon2
            .hash_password(encoded_user.as_bytes(), &salt)
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

        let digest = Sha256::digest(hash.to_string().as_bytes());
        Ok(hex::encode(digest))
    }
}

impl TokenSource for TokenGenerator {
    fn generate(&self, encoded_user: &str) -> Result<String, AuthError> {
        TokenGenerator::generate(self, encoded_user)
    }
}
