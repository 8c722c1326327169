//! Request authorization stages.
//!
//! Flow Overview:
//! 1) `identify` turns the `Authorization` header into an `Identity`. No header
//!    means anonymous; a header that is not `Bearer <token>` is rejected before
//!    any lookup.
//! 2) `authorize` checks an identity against a `Requirement`. Requirements are
//!    ordered: a permission implies activation, which implies authentication.
//!    The first failing stage decides the rejection.
//!
//! Permissions are read from the store on every call; grants can change
//! between requests.

use super::{
    identity::Identity,
    token::Scope,
    tokens::{TokenError, TokenManager},
};
use crate::{
    models::User,
    store::{PermissionStore, StoreError},
};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed authorization header")]
    TokenMalformed,
    #[error("invalid or missing authentication token")]
    AuthenticationInvalid,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("account is not activated")]
    AccountInactive,
    #[error("missing permission")]
    PermissionDenied,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Minimum stage an endpoint needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Activated,
    Permission(&'static str),
}

/// Extract the bearer token, if any.
///
/// # Errors
/// Returns `AuthError::TokenMalformed` unless the header is exactly
/// `Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::TokenMalformed)?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(Some(token)),
        _ => Err(AuthError::TokenMalformed),
    }
}

/// Resolve the request's credential to an identity.
///
/// # Errors
/// `TokenMalformed` for a bad header, `AuthenticationInvalid` for an unknown or
/// expired token, `Storage` when the lookup itself fails.
pub async fn identify(tokens: &TokenManager, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let Some(plaintext) = bearer_token(headers)? else {
        return Ok(Identity::Anonymous);
    };
    match tokens.resolve(Scope::Authentication, plaintext).await {
        Ok(user) => {
            debug!(user_id = user.id, "request authenticated");
            Ok(Identity::User(user))
        }
        Err(TokenError::Storage(err)) => Err(AuthError::Storage(err)),
        Err(TokenError::Invalid | TokenError::Entropy(_)) => Err(AuthError::AuthenticationInvalid),
    }
}

/// Check `identity` against `requirement`, returning the account on success.
///
/// # Errors
/// The rejection of the first stage that fails.
pub async fn authorize<'a>(
    identity: &'a Identity,
    requirement: Requirement,
    permissions: &dyn PermissionStore,
) -> Result<&'a User, AuthError> {
    let Identity::User(user) = identity else {
        return Err(AuthError::AuthenticationRequired);
    };
    if requirement == Requirement::Authenticated {
        return Ok(user);
    }

    if !user.activated {
        return Err(AuthError::AccountInactive);
    }

    if let Requirement::Permission(code) = requirement {
        let granted = permissions.all_for_user(user.id).await?;
        if !granted.include(code) {
            debug!(user_id = user.id, code, "permission denied");
            return Err(AuthError::PermissionDenied);
        }
    }

    Ok(user)
}
