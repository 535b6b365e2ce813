use bcrypt::{hash, verify, DEFAULT_COST};
use thiserror::Error;

/// Hashes a password with bcrypt on the blocking thread pool.
///
/// Bcrypt is CPU-bound, so the work is moved off the async runtime.
pub async fn hash_password(password: &str) -> Result<String, PasswordError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST).map_err(PasswordError::Hash))
        .await
        .map_err(PasswordError::Join)?
}

/// Verifies a password against a stored bcrypt hash.
pub async fn verify_password(password: &str, hashed: &str) -> Result<bool, PasswordError> {
    let password = password.to_owned();
    let hashed = hashed.to_owned();
    tokio::task::spawn_blocking(move || verify(password, &hashed).map_err(PasswordError::Hash))
        .await
        .map_err(PasswordError::Join)?
}

/// Errors that can occur while hashing or verifying credentials.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("bcrypt failure: {0}")]
    Hash(bcrypt::BcryptError),
    #[error("hashing task failed: {0}")]
    Join(tokio::task::JoinError),
}
