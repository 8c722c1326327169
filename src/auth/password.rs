//! Password hashing and verification.
//!
//! Passwords are stored as Argon2id PHC strings. The cost parameters are baked
//! into each stored string, so changing the defaults only affects new hashes
//! and older hashes keep verifying.
//!
//! Hashing is CPU bound and runs on the blocking pool; no lock is held while it
//! runs.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use tokio::task;

/// Memory cost in KiB for new hashes (19 MiB).
pub const MEMORY_COST_KIB: u32 = 19_456;
/// Number of passes for new hashes.
pub const TIME_COST: u32 = 2;
/// Lanes for new hashes.
pub const PARALLELISM: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hashing(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("password worker did not complete: {0}")]
    Worker(#[from] task::JoinError),
}

#[derive(Clone, Debug)]
pub struct CredentialVerifier {
    params: Params,
}

impl CredentialVerifier {
    /// Verifier using the production cost parameters.
    ///
    /// # Errors
    /// Returns an error if the built-in parameters are rejected by argon2.
    pub fn new() -> Result<Self, CredentialError> {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
            .map_err(|err| CredentialError::Hashing(err.to_string()))?;
        Ok(Self { params })
    }

    /// Verifier with explicit cost parameters (cheap ones keep tests fast).
    #[must_use]
    pub fn with_params(params: Params) -> Self {
        Self { params }
    }

    /// Hash `plaintext` with a fresh random salt.
    ///
    /// # Errors
    /// Returns `CredentialError::Hashing` if argon2 cannot allocate or run.
    pub async fn set(&self, plaintext: SecretString) -> Result<String, CredentialError> {
        let params = self.params.clone();
        task::spawn_blocking(move || hash_blocking(&params, &plaintext)).await?
    }

    /// Check `plaintext` against a stored hash. A mismatch is `Ok(false)`.
    ///
    /// # Errors
    /// Returns `CredentialError::MalformedHash` if `hash` is not a usable PHC string.
    pub async fn matches(
        &self,
        hash: String,
        plaintext: SecretString,
    ) -> Result<bool, CredentialError> {
        task::spawn_blocking(move || verify_blocking(&hash, &plaintext)).await?
    }
}

fn hash_blocking(params: &Params, plaintext: &SecretString) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(plaintext.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| CredentialError::Hashing(err.to_string()))
}

fn verify_blocking(hash: &str, plaintext: &SecretString) -> Result<bool, CredentialError> {
    let parsed =
        PasswordHash::new(hash).map_err(|err| CredentialError::MalformedHash(err.to_string()))?;
    // Params and salt come from the PHC string itself.
    match Argon2::default().verify_password(plaintext.expose_secret().as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(CredentialError::MalformedHash(err.to_string())),
    }
}

#[cfg(test)]
pub(crate) fn test_verifier() -> CredentialVerifier {
    match Params::new(Params::MIN_M_COST, 1, 1, None) {
        Ok(params) => CredentialVerifier::with_params(params),
        Err(err) => panic!("invalid test params: {err}"),
    }
}
