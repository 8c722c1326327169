//! Route handlers and the JSON envelopes they answer with.
//!
//! Every response body is wrapped in a single named key (`{"movie": ..}`,
//! `{"user": ..}`) so clients can tell payload kinds apart without sniffing.

pub mod debug;
pub mod health;
pub mod movies;
pub mod tokens;
pub mod users;

use crate::{
    api::errors::ApiError,
    auth::TokenResponse,
    models::{Movie, User},
    validator::Validator,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: User,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MoviesEnvelope {
    pub movies: Vec<Movie>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthenticationTokenEnvelope {
    pub authentication_token: TokenResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageEnvelope {
    pub message: String,
}

impl MessageEnvelope {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Turn an accumulated validator into a 422 when anything failed.
pub(crate) fn ensure_valid(v: Validator) -> Result<(), ApiError> {
    if v.valid() {
        Ok(())
    } else {
        Err(ApiError::Validation(v.into_errors()))
    }
}
