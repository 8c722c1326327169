//! Account registration, activation and password reset.

use super::{MessageEnvelope, UserEnvelope, ensure_valid};
use crate::{
    api::{
        email::EmailMessage,
        errors::{ApiError, ErrorMessage},
        state::AppState,
    },
    auth::{Scope, TokenError, permissions::MOVIES_READ, token::validate_plaintext},
    models::{
        NewUser,
        user::{validate_email, validate_name, validate_password_plaintext},
    },
    store::StoreError,
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
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUser {
    pub token: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ResetPassword {
    pub password: String,
    pub token: String,
}

/// Create an inactive account and mail it an activation token.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = RegisterUser,
    responses(
        (status = 202, description = "Account created, activation mail queued", body = UserEnvelope),
        (status = 400, description = "Malformed body", body = ErrorMessage),
        (status = 422, description = "Validation failed")
    ),
    tag = "users"
)]
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<RegisterUser>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_name(&mut v, &input.name);
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    ensure_valid(v)?;

    let password_hash = state
        .credentials()
        .set(SecretString::from(input.password))
        .await?;

    let user = match state
        .stores()
        .users
        .insert(NewUser {
            name: input.name,
            email: input.email,
            password_hash,
            activated: false,
        })
        .await
    {
        Ok(user) => user,
        Err(StoreError::DuplicateEmail) => {
            return Err(ApiError::field(
                "email",
                "a user with this email address already exists",
            ));
        }
        Err(err) => return Err(err.into()),
    };

    state
        .stores()
        .permissions
        .add_for_user(user.id, &[MOVIES_READ])
        .await?;

    let token = state
        .tokens()
        .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
        .await?;

    state.notifier().dispatch(EmailMessage::new(
        &user.email,
        "user_welcome",
        &json!({ "activationToken": token.plaintext, "userID": user.id }),
    ));

    info!(user_id = user.id, "user registered");
    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}

/// Activate the account owning an activation token.
#[utoipa::path(
    put,
    path = "/v1/users/activated",
    request_body = ActivateUser,
    responses(
        (status = 200, description = "Account activated", body = UserEnvelope),
        (status = 409, description = "Edit conflict", body = ErrorMessage),
        (status = 422, description = "Invalid or expired token")
    ),
    tag = "users"
)]
pub async fn activate(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ActivateUser>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_plaintext(&mut v, &input.token);
    ensure_valid(v)?;

    let mut user = match state
        .tokens()
        .resolve(Scope::Activation, &input.token)
        .await
    {
        Ok(user) => user,
        Err(TokenError::Invalid) => {
            return Err(ApiError::field(
                "token",
                "invalid or expired activation token",
            ));
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    state.stores().users.update(&mut user).await?;

    state
        .tokens()
        .revoke_all(Scope::Activation, user.id)
        .await?;

    info!(user_id = user.id, "user activated");
    Ok(Json(UserEnvelope { user }))
}

/// Set a new password using a password-reset token.
#[utoipa::path(
    put,
    path = "/v1/users/password",
    request_body = ResetPassword,
    responses(
        (status = 200, description = "Password changed", body = MessageEnvelope),
        (status = 409, description = "Edit conflict", body = ErrorMessage),
        (status = 422, description = "Validation failed or token invalid")
    ),
    tag = "users"
)]
pub async fn update_password(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ResetPassword>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    validate_password_plaintext(&mut v, &input.password);
    validate_plaintext(&mut v, &input.token);
    ensure_valid(v)?;

    let mut user = match state
        .tokens()
        .resolve(Scope::PasswordReset, &input.token)
        .await
    {
        Ok(user) => user,
        Err(TokenError::Invalid) => {
            return Err(ApiError::field(
                "token",
                "invalid or expired password reset token",
            ));
        }
        Err(err) => return Err(err.into()),
    };

    user.password_hash = state
        .credentials()
        .set(SecretString::from(input.password))
        .await?;
    state.stores().users.update(&mut user).await?;

    state
        .tokens()
        .revoke_all(Scope::PasswordReset, user.id)
        .await?;

    Ok(Json(MessageEnvelope::new(
        "your password was successfully reset",
    )))
}
