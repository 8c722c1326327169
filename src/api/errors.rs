//! Error type returned by every handler, extractor and middleware.
//!
//! Client-facing messages are fixed strings. Internal failures are logged inside
//! the current `http.request` span and surfaced as a generic 500.

use crate::{
    auth::{AuthError, CredentialError, TokenError},
    models::InvariantViolation,
    store::StoreError,
    validator::FieldErrors,
};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::error;
use utoipa::ToSchema;

pub const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// Body of every non-validation error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorMessage {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("failed validation")]
    Validation(FieldErrors),
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error("you must be authenticated to use this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Single-field validation failure.
    #[must_use]
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        Self::Validation(errors)
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::InvalidCredentials
            | Self::InvalidAuthenticationToken
            | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::InactiveAccount | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenge = matches!(self, Self::InvalidAuthenticationToken);
        let mut response = match self {
            Self::Validation(errors) => (status, Json(json!({ "error": errors }))).into_response(),
            Self::Internal(err) => {
                error!("{err:#}");
                (status, Json(json!({ "error": INTERNAL_MESSAGE }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        };
        if challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EditConflict => Self::EditConflict,
            other => Self::Internal(other.into()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenMalformed | AuthError::AuthenticationInvalid => {
                Self::InvalidAuthenticationToken
            }
            AuthError::AuthenticationRequired => Self::AuthenticationRequired,
            AuthError::AccountInactive => Self::InactiveAccount,
            AuthError::PermissionDenied => Self::NotPermitted,
            AuthError::Storage(err) => err.into(),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::InvalidAuthenticationToken,
            TokenError::Storage(err) => err.into(),
            TokenError::Entropy(err) => Self::Internal(err.into()),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<InvariantViolation> for ApiError {
    fn from(err: InvariantViolation) -> Self {
        Self::Internal(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> anyhow::Result<serde_json::Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[tokio::test]
    async fn internal_errors_are_opaque() -> anyhow::Result<()> {
        let response =
            ApiError::Internal(anyhow::anyhow!("connection refused to 10.0.0.7")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await?;
        assert_eq!(body["error"], INTERNAL_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn validation_lists_fields() -> anyhow::Result<()> {
        let response = ApiError::field("email", "must be provided").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await?;
        assert_eq!(body["error"]["email"], "must be provided");
        Ok(())
    }

    #[test]
    fn invalid_token_challenges() {
        let response = ApiError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE),
            Some(&HeaderValue::from_static("Bearer"))
        );
    }

    #[test]
    fn auth_errors_map_to_status() {
        let cases = [
            (AuthError::TokenMalformed, StatusCode::UNAUTHORIZED),
            (AuthError::AuthenticationInvalid, StatusCode::UNAUTHORIZED),
            (AuthError::AuthenticationRequired, StatusCode::UNAUTHORIZED),
            (AuthError::AccountInactive, StatusCode::FORBIDDEN),
            (AuthError::PermissionDenied, StatusCode::FORBIDDEN),
            (
                AuthError::Storage(StoreError::Timeout("SELECT tokens")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn edit_conflict_is_409() {
        assert_eq!(
            ApiError::from(StoreError::EditConflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::DuplicateEmail).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
