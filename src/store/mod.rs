//! Storage contracts and their implementations.
//!
//! Handlers and the auth pipeline only see the traits defined here. Two
//! implementations exist: `postgres` for production and `memory` for tests and
//! local experiments. Both honour the same conditional-update contract from
//! `versioning`.

use crate::{
    auth::{permissions::Permissions, token::{Scope, TokenRecord}},
    models::{Movie, MovieQuery, NewMovie, NewUser, User},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::{future::Future, sync::Arc, time::Duration};

pub mod memory;
pub mod postgres;
pub mod versioning;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Upper bound for any single storage round trip.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("storage deadline exceeded during {0}")]
    Timeout(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Conditional on `user.version`; bumps it in place on success.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError>;
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError>;
    /// Owner of a token with this hash and scope that is still valid at `now`.
    async fn user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError>;
    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError>;
    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>, StoreError>;
    /// Conditional on `movie.version`; bumps it in place on success.
    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError>;
}

/// One handle per storage concern, shared by every request.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }

    #[must_use]
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }
}

/// Run a storage future under `QUERY_TIMEOUT`.
///
/// # Errors
/// Returns `StoreError::Timeout` when the deadline passes first, otherwise the
/// future's own error.
pub async fn with_deadline<T, E, F>(operation: &'static str, future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StoreError>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, future).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(StoreError::Timeout(operation)),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[tokio::test(start_paused = true)]
    async fn deadline_turns_hang_into_timeout() {
        let result: Result<(), StoreError> = with_deadline("SELECT", async {
            tokio::time::sleep(QUERY_TIMEOUT + Duration::from_millis(1)).await;
            Ok::<(), sqlx::Error>(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout("SELECT"))));
    }

    #[tokio::test]
    async fn deadline_passes_through_errors() {
        let result: Result<(), StoreError> =
            with_deadline("SELECT", async { Err(sqlx::Error::RowNotFound) }).await;
        assert!(matches!(
            result,
            Err(StoreError::Database(sqlx::Error::RowNotFound))
        ));
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_uses_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23503"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
