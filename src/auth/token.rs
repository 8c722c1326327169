//! Token primitives: scopes, plaintext generation, shape checks and hashing.

use crate::validator::Validator;
use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, rngs::OsRng};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Plaintext tokens are exactly this many characters long.
pub const TOKEN_LENGTH: usize = 26;

/// RFC 4648 base32 alphabet. 32 divides 256, so `byte % 32` is unbiased.
const TOKEN_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// What a token may be used for. Lookups always filter by scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    Activation,
    Authentication,
    PasswordReset,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
            Self::PasswordReset => "password-reset",
        }
    }

    /// Lifetime used when a token of this scope is issued.
    #[must_use]
    pub fn ttl(self) -> TimeDelta {
        match self {
            Self::Activation => TimeDelta::days(3),
            Self::Authentication => TimeDelta::hours(24),
            Self::PasswordReset => TimeDelta::minutes(45),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown token scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for Scope {
    type Err = UnknownScope;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "activation" => Ok(Self::Activation),
            "authentication" => Ok(Self::Authentication),
            "password-reset" => Ok(Self::PasswordReset),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

/// The persisted form of a token. Never carries the plaintext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub hash: Vec<u8>,
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    pub scope: Scope,
}

/// A freshly issued token. The plaintext exists only in this value.
#[derive(Clone)]
pub struct Token {
    pub plaintext: String,
    pub record: TokenRecord,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[redacted]")
            .field("user_id", &self.record.user_id)
            .field("expiry", &self.record.expiry)
            .field("scope", &self.record.scope)
            .finish()
    }
}

/// Body returned to a client when a token is handed out.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

impl From<Token> for TokenResponse {
    fn from(token: Token) -> Self {
        Self {
            token: token.plaintext,
            expiry: token.record.expiry,
        }
    }
}

/// Generate a new plaintext from the OS random source (130 bits of entropy).
///
/// # Errors
/// Returns an error if the OS random source is unavailable.
pub fn generate_plaintext() -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_LENGTH];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|byte| char::from(TOKEN_ALPHABET[usize::from(*byte) % TOKEN_ALPHABET.len()]))
        .collect())
}

/// True when `plaintext` could have been produced by `generate_plaintext`.
#[must_use]
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_LENGTH && plaintext.bytes().all(|b| TOKEN_ALPHABET.contains(&b))
}

/// Hash a plaintext so only the digest ever reaches storage.
#[must_use]
pub fn hash_token(plaintext: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().to_vec()
}

pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_LENGTH,
        "token",
        "must be 26 bytes long",
    );
}
