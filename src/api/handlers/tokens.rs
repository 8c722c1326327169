//! Token issuing endpoints: login, activation re-send and password-reset request.

use super::{AuthenticationTokenEnvelope, MessageEnvelope, ensure_valid};
use crate::{
    api::{
        email::EmailMessage,
        errors::{ApiError, ErrorMessage},
        state::AppState,
    },
    auth::Scope,
    models::{
        User,
        user::{validate_email, validate_password_plaintext},
    },
    validator::Validator,
};
use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct EmailAddress {
    pub email: String,
}

/// Exchange e-mail and password for an authentication token.
#[utoipa::path(
    post,
    path = "/v1/tokens/authentication",
    request_body = Credentials,
    responses(
        (status = 201, description = "Token issued", body = AuthenticationTokenEnvelope),
        (status = 401, description = "Invalid credentials", body = ErrorMessage),
        (status = 422, description = "Validation failed")
    ),
    tag = "tokens"
)]
pub async fn create_authentication_token(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    ensure_valid(v)?;

    let Some(user) = state.stores().users.get_by_email(&input.email).await? else {
        debug!("login for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let matches = state
        .credentials()
        .matches(user.password_hash.clone(), SecretString::from(input.password))
        .await?;
    if !matches {
        debug!(user_id = user.id, "login with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .tokens()
        .issue(user.id, Scope::Authentication.ttl(), Scope::Authentication)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthenticationTokenEnvelope {
            authentication_token: token.into(),
        }),
    ))
}

/// Mail a fresh activation token to an account that is not active yet.
#[utoipa::path(
    post,
    path = "/v1/tokens/activation",
    request_body = EmailAddress,
    responses(
        (status = 202, description = "Activation mail queued", body = MessageEnvelope),
        (status = 422, description = "Unknown or already activated account")
    ),
    tag = "tokens"
)]
pub async fn create_activation_token(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<EmailAddress>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;
    let user = lookup_account(&state, &input.email).await?;

    if user.activated {
        return Err(ApiError::field("email", "user has already been activated"));
    }

    let token = state
        .tokens()
        .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
        .await?;

    state.notifier().dispatch(EmailMessage::new(
        &user.email,
        "token_activation",
        &json!({ "activationToken": token.plaintext }),
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageEnvelope::new(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}

/// Mail a password-reset token to an activated account.
#[utoipa::path(
    post,
    path = "/v1/tokens/password-reset",
    request_body = EmailAddress,
    responses(
        (status = 202, description = "Reset mail queued", body = MessageEnvelope),
        (status = 422, description = "Unknown or inactive account")
    ),
    tag = "tokens"
)]
pub async fn create_password_reset_token(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<EmailAddress>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;
    let user = lookup_account(&state, &input.email).await?;

    if !user.activated {
        return Err(ApiError::field("email", "user account must be activated"));
    }

    let token = state
        .tokens()
        .issue(user.id, Scope::PasswordReset.ttl(), Scope::PasswordReset)
        .await?;

    state.notifier().dispatch(EmailMessage::new(
        &user.email,
        "token_password_reset",
        &json!({ "passwordResetToken": token.plaintext }),
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageEnvelope::new(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}

async fn lookup_account(state: &AppState, email: &str) -> Result<User, ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, email);
    ensure_valid(v)?;

    state
        .stores()
        .users
        .get_by_email(email)
        .await?
        .ok_or_else(|| ApiError::field("email", "no matching email address found"))
}
