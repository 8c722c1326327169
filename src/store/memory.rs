//! In-process store with the same contract as the Postgres one.
//!
//! All state sits behind a single async mutex, so every operation (including
//! the version check of an update) is atomic with respect to the others.

use super::{
    MovieStore, PermissionStore, StoreError, TokenStore, UserStore,
    versioning::{INITIAL_VERSION, compare_and_swap},
};
use crate::{
    auth::{
        permissions::Permissions,
        token::{Scope, TokenRecord},
    },
    models::{Movie, MovieQuery, NewMovie, NewUser, SortDirection, User},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap},
};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    next_user_id: i64,
    next_movie_id: i64,
    users: BTreeMap<i64, User>,
    tokens: Vec<TokenRecord>,
    grants: HashMap<i64, BTreeSet<String>>,
    movies: BTreeMap<i64, Movie>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.users
            .values()
            .any(|user| Some(user.id) != except && user.email.eq_ignore_ascii_case(email))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every token row currently held, in insertion order.
    pub async fn token_records(&self) -> Vec<TokenRecord> {
        self.inner.lock().await.tokens.clone()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }
        inner.next_user_id += 1;
        let stored = User {
            id: inner.next_user_id,
            created_at: Utc::now(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: INITIAL_VERSION,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.email_taken(&user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }
        let Some(stored) = inner.users.get_mut(&user.id) else {
            return Err(StoreError::EditConflict);
        };
        compare_and_swap(stored, user)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError> {
        self.inner.lock().await.tokens.push(token.clone());
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .tokens
            .retain(|token| !(token.scope == scope && token.user_id == user_id));
        Ok(())
    }

    async fn user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tokens
            .iter()
            .find(|token| token.scope == scope && token.hash == hash && token.expiry > now)
            .and_then(|token| inner.users.get(&token.user_id))
            .cloned())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .grants
            .get(&user_id)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .grants
            .entry(user_id)
            .or_default()
            .extend(codes.iter().map(|code| (*code).to_string()));
        Ok(())
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_movie_id += 1;
        let stored = Movie {
            id: inner.next_movie_id,
            created_at: Utc::now(),
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version: INITIAL_VERSION,
        };
        inner.movies.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        Ok(self.inner.lock().await.movies.get(&id).cloned())
    }

    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>, StoreError> {
        let inner = self.inner.lock().await;
        let words: Vec<String> = query
            .title
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut movies: Vec<Movie> = inner
            .movies
            .values()
            .filter(|movie| title_matches(&movie.title, &words))
            .filter(|movie| query.genres.iter().all(|genre| movie.genres.contains(genre)))
            .cloned()
            .collect();

        movies.sort_by(|a, b| {
            let primary = compare_column(a, b, query.sort.column);
            let primary = match query.sort.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(0);
        Ok(movies.into_iter().skip(offset).take(limit).collect())
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.movies.get_mut(&movie.id) else {
            return Err(StoreError::EditConflict);
        };
        compare_and_swap(stored, movie)
    }
}

fn title_matches(title: &str, words: &[String]) -> bool {
    let title_words: Vec<String> = title.split_whitespace().map(str::to_lowercase).collect();
    words.iter().all(|word| title_words.contains(word))
}

fn compare_column(a: &Movie, b: &Movie, column: &str) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}
