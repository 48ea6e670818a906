//! Password hashing and verification using Argon2id

use crate::{config::AppConfig, error::AppError};
use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use rand::{distributions::Alphanumeric, Rng};

/// Shortest password accepted by [`CredentialHasher::hash`].
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// One-way password hasher with a fixed work factor.
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    /// Hash of a random throwaway password, verified against when the
    /// identity lookup misses so both login failure paths cost the same.
    dummy_hash: String,
}

impl CredentialHasher {
    /// Create hasher with default parameters (OWASP recommended)
    pub fn new() -> Self {
        // m=64MiB, t=3 iterations, p=4 lanes
        Self::with_params(65536, 3, 4).expect("Invalid Argon2 params")
    }

    /// Create hasher with explicit Argon2id cost parameters
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let throwaway: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let dummy_hash = hash_with(&argon2, &throwaway)?;

        Ok(Self { argon2, dummy_hash })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::with_params(
            config.security.password_hash_memory_kib,
            config.security.password_hash_iterations,
            config.security.password_hash_parallelism,
        )
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AppError::PasswordTooShort);
        }

        hash_with(&self.argon2, password)
    }

    /// Verify a password against a hash.
    ///
    /// A malformed hash and a wrong password are both reported as `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!("Failed to parse password hash: {:?}", e);
                return false;
            }
        };

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Spend one verification's worth of work without checking anything.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            tracing::error!("Failed to hash password: {:?}", e);
            AppError::internal("Failed to hash password", e)
        })?
        .to_string();

    Ok(password_hash)
}
