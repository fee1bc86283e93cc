use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use rand::rngs::OsRng;

use crate::error::ApiError;

/// Hash used for unknown usernames so a failed login costs the same as a wrong password.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hash_password("dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=19456,t=2,p=1$dW5rbm93bg$dW5rbm93bg".to_string())
});

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("hashing task failed: {0}")]
    Task(String),
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::internal(err.to_string())
    }
}

/// Hashes a password with Argon2id and a fresh random salt, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Checks a candidate password against a stored PHC hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// Argon2 is CPU-bound; these keep it off the async workers.

pub async fn hash_password_async(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

pub async fn verify_password_async(password: String, hash: String) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))?
}

/// Computes the dummy hash up front so the first unknown-user login costs no more
/// than any other.
pub async fn prime_dummy_hash() -> Result<(), PasswordError> {
    tokio::task::spawn_blocking(|| {
        LazyLock::force(&DUMMY_HASH);
    })
    .await
    .map_err(|e| PasswordError::Task(e.to_string()))
}

/// Burns one verification against the dummy hash. The result is always discarded.
pub async fn verify_dummy(password: String) {
    let outcome = tokio::task::spawn_blocking(move || verify_password(&password, &DUMMY_HASH))
        .await
        .map_err(|e| PasswordError::Task(e.to_string()))
        .and_then(|verified| verified);
    if let Err(e) = outcome {
        tracing::warn!(error = %e, "dummy hash verification failed unexpectedly");
    }
}
