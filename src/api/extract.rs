//! Extractors that gate a handler on a pipeline stage.
//!
//! Each reads the `Identity` attached by the identify middleware and runs
//! `authorize` with the stage it stands for. A handler asking for
//! `Permitted<MoviesWrite>` therefore also requires activation and
//! authentication.

use super::{errors::ApiError, state::AppState};
use crate::{
    auth::{Identity, PermissionCode, Requirement, authorize},
    models::User,
};
use anyhow::anyhow;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::{marker::PhantomData, sync::Arc};

async fn gate(parts: &Parts, requirement: Requirement) -> Result<User, ApiError> {
    let state = parts
        .extensions
        .get::<Arc<AppState>>()
        .cloned()
        .ok_or_else(|| ApiError::Internal(anyhow!("application state missing from request")))?;
    let identity = parts
        .extensions
        .get::<Identity>()
        .cloned()
        .unwrap_or_default();
    let user = authorize(
        &identity,
        requirement,
        state.stores().permissions.as_ref(),
    )
    .await?;
    Ok(user.clone())
}

/// Any signed-in account, activated or not.
#[derive(Debug)]
pub struct Authenticated(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        gate(parts, Requirement::Authenticated).await.map(Self)
    }
}

/// A signed-in, activated account.
#[derive(Debug)]
pub struct Activated(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Activated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        gate(parts, Requirement::Activated).await.map(Self)
    }
}

/// An activated account currently holding permission `P`.
#[derive(Debug)]
pub struct Permitted<P> {
    pub user: User,
    code: PhantomData<fn() -> P>,
}

impl<P: PermissionCode, S: Send + Sync> FromRequestParts<S> for Permitted<P> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = gate(parts, Requirement::Permission(P::CODE)).await?;
        Ok(Self {
            user,
            code: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::email::{LogEmailSender, spawn_notifier},
        auth::{MoviesRead, password::test_verifier, permissions::MOVIES_READ},
        models::NewUser,
        rate_limit::{RateLimitConfig, RateLimiter},
        store::{MemoryStore, PermissionStore, Stores, UserStore},
    };
    use axum::http::Request;

    fn parts_with_state() -> (Parts, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let (notifier, _worker) = spawn_notifier(Arc::new(LogEmailSender::new(String::new())));
        let state = Arc::new(AppState::new(
            "testing".to_string(),
            Stores::memory(store.clone()),
            test_verifier(),
            Arc::new(RateLimiter::new(RateLimitConfig::new())),
            notifier,
        ));
        let (mut parts, ()) = Request::new(()).into_parts();
        parts.extensions.insert(state);
        (parts, store)
    }

    async fn account(store: &MemoryStore, activated: bool) -> anyhow::Result<User> {
        Ok(UserStore::insert(
            store,
            NewUser {
                name: "Dana".to_string(),
                email: "dana@example.com".to_string(),
                password_hash: "hash".to_string(),
                activated,
            },
        )
        .await?)
    }

    #[tokio::test]
    async fn missing_identity_is_anonymous() -> anyhow::Result<()> {
        let (mut parts, _store) = parts_with_state();
        let result = Authenticated::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::AuthenticationRequired)));
        Ok(())
    }

    #[tokio::test]
    async fn stages_build_on_each_other() -> anyhow::Result<()> {
        let (mut parts, store) = parts_with_state();
        let pending = account(&store, false).await?;
        parts.extensions.insert(Identity::User(pending.clone()));
        let Authenticated(user) = Authenticated::from_request_parts(&mut parts, &()).await?;
        assert_eq!(user.id, pending.id);

        let result = Activated::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::InactiveAccount)));

        let result = Permitted::<MoviesRead>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::InactiveAccount)));
        Ok(())
    }

    #[tokio::test]
    async fn permitted_reads_grants_from_state() -> anyhow::Result<()> {
        let (mut parts, store) = parts_with_state();
        let reader = account(&store, true).await?;
        parts.extensions.insert(Identity::User(reader.clone()));

        let Activated(user) = Activated::from_request_parts(&mut parts, &()).await?;
        assert_eq!(user.id, reader.id);

        let result = Permitted::<MoviesRead>::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::NotPermitted)));

        store.add_for_user(reader.id, &[MOVIES_READ]).await?;
        let permit = Permitted::<MoviesRead>::from_request_parts(&mut parts, &()).await?;
        assert_eq!(permit.user.id, reader.id);
        Ok(())
    }
}
