//! Issue, resolve and revoke scoped tokens.

use super::token::{Scope, Token, TokenRecord, generate_plaintext, hash_token, is_well_formed};
use crate::{
    models::User,
    store::{StoreError, TokenStore},
};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Wrong shape, unknown, expired or issued for another scope.
    #[error("invalid or expired token")]
    Invalid,
    #[error("failed to generate token: {0}")]
    Entropy(#[from] rand::Error),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Issue a token for `user_id` valid for `ttl`.
    ///
    /// # Errors
    /// Returns `TokenError::Entropy` if randomness is unavailable and
    /// `TokenError::Storage` if the hash cannot be persisted.
    pub async fn issue(
        &self,
        user_id: i64,
        ttl: TimeDelta,
        scope: Scope,
    ) -> Result<Token, TokenError> {
        self.issue_at(user_id, ttl, scope, Utc::now()).await
    }

    /// Issue with an explicit clock reading.
    ///
    /// # Errors
    /// Same as `issue`.
    #[instrument(skip(self), level = "debug")]
    pub async fn issue_at(
        &self,
        user_id: i64,
        ttl: TimeDelta,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> Result<Token, TokenError> {
        let plaintext = generate_plaintext()?;
        let record = TokenRecord {
            hash: hash_token(&plaintext),
            user_id,
            expiry: now + ttl,
            scope,
        };
        self.store.insert(&record).await?;
        debug!(expiry = %record.expiry, "token issued");
        Ok(Token { plaintext, record })
    }

    /// Resolve a presented plaintext to the user that owns it.
    ///
    /// # Errors
    /// Returns `TokenError::Invalid` for a malformed plaintext (without touching
    /// storage) or when no unexpired token of `scope` matches. Storage failures
    /// are `TokenError::Storage`.
    pub async fn resolve(&self, scope: Scope, plaintext: &str) -> Result<User, TokenError> {
        self.resolve_at(scope, plaintext, Utc::now()).await
    }

    /// Resolve against an explicit clock reading.
    ///
    /// # Errors
    /// Same as `resolve`.
    #[instrument(skip(self, plaintext), level = "debug")]
    pub async fn resolve_at(
        &self,
        scope: Scope,
        plaintext: &str,
        now: DateTime<Utc>,
    ) -> Result<User, TokenError> {
        if !is_well_formed(plaintext) {
            return Err(TokenError::Invalid);
        }
        self.store
            .user_for_token(scope, &hash_token(plaintext), now)
            .await?
            .ok_or(TokenError::Invalid)
    }

    /// Delete every token of `scope` held by `user_id`.
    ///
    /// # Errors
    /// Returns `TokenError::Storage` if the delete fails.
    #[instrument(skip(self), level = "debug")]
    pub async fn revoke_all(&self, scope: Scope, user_id: i64) -> Result<(), TokenError> {
        self.store.delete_all_for_user(scope, user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::store::{MemoryStore, UserStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn setup() -> anyhow::Result<(Arc<MemoryStore>, TokenManager, User)> {
        let store = Arc::new(MemoryStore::new());
        let user = UserStore::insert(
            store.as_ref(),
            NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
                activated: true,
            },
        )
        .await?;
        Ok((store.clone(), TokenManager::new(store), user))
    }

    #[tokio::test]
    async fn resolve_until_expiry() -> anyhow::Result<()> {
        let (_store, tokens, user) = setup().await?;
        let issued_at = Utc::now();
        let ttl = TimeDelta::minutes(45);
        let token = tokens
            .issue_at(user.id, ttl, Scope::PasswordReset, issued_at)
            .await?;

        let resolved = tokens
            .resolve_at(Scope::PasswordReset, &token.plaintext, issued_at)
            .await?;
        assert_eq!(resolved.id, user.id);

        let almost = issued_at + ttl - TimeDelta::seconds(1);
        assert!(tokens
            .resolve_at(Scope::PasswordReset, &token.plaintext, almost)
            .await
            .is_ok());

        let expired = tokens
            .resolve_at(Scope::PasswordReset, &token.plaintext, issued_at + ttl)
            .await;
        assert!(matches!(expired, Err(TokenError::Invalid)));
        Ok(())
    }

    #[tokio::test]
    async fn scope_must_match() -> anyhow::Result<()> {
        let (_store, tokens, user) = setup().await?;
        let token = tokens
            .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
            .await?;
        let result = tokens.resolve(Scope::Authentication, &token.plaintext).await;
        assert!(matches!(result, Err(TokenError::Invalid)));
        Ok(())
    }

    #[tokio::test]
    async fn only_the_hash_is_stored() -> anyhow::Result<()> {
        let (store, tokens, user) = setup().await?;
        let token = tokens
            .issue(user.id, Scope::Authentication.ttl(), Scope::Authentication)
            .await?;
        let stored = store.token_records().await;
        assert_eq!(stored.len(), 1);
        assert_ne!(stored[0].hash.as_slice(), token.plaintext.as_bytes());
        assert_eq!(stored[0].hash, hash_token(&token.plaintext));
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_is_scoped() -> anyhow::Result<()> {
        let (_store, tokens, user) = setup().await?;
        let first = tokens
            .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
            .await?;
        let second = tokens
            .issue(user.id, Scope::Activation.ttl(), Scope::Activation)
            .await?;
        let login = tokens
            .issue(user.id, Scope::Authentication.ttl(), Scope::Authentication)
            .await?;

        tokens.revoke_all(Scope::Activation, user.id).await?;

        for plaintext in [&first.plaintext, &second.plaintext] {
            let result = tokens.resolve(Scope::Activation, plaintext).await;
            assert!(matches!(result, Err(TokenError::Invalid)));
        }
        assert!(tokens
            .resolve(Scope::Authentication, &login.plaintext)
            .await
            .is_ok());
        Ok(())
    }

    struct CountingStore {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl TokenStore for CountingStore {
        async fn insert(&self, _token: &TokenRecord) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_all_for_user(&self, _scope: Scope, _user_id: i64) -> Result<(), StoreError> {
            Ok(())
        }

        async fn user_for_token(
            &self,
            _scope: Scope,
            _hash: &[u8],
            _now: DateTime<Utc>,
        ) -> Result<Option<User>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Timeout("SELECT"))
        }
    }

    #[tokio::test]
    async fn malformed_plaintext_skips_storage() {
        let store = Arc::new(CountingStore {
            lookups: AtomicUsize::new(0),
        });
        let tokens = TokenManager::new(store.clone());
        let result = tokens.resolve(Scope::Authentication, "too-short").await;
        assert!(matches!(result, Err(TokenError::Invalid)));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_not_invalid() {
        let store = Arc::new(CountingStore {
            lookups: AtomicUsize::new(0),
        });
        let tokens = TokenManager::new(store.clone());
        let result = tokens
            .resolve(Scope::Authentication, "AAAAAAAAAAAAAAAAAAAAAAAAAA")
            .await;
        assert!(matches!(
            result,
            Err(TokenError::Storage(StoreError::Timeout(_)))
        ));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    }
}
