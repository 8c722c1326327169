//! `PostgreSQL` store.
//!
//! Every statement runs inside a `db.query` span and under `QUERY_TIMEOUT`.
//! Updates are conditional on the version column and report
//! `StoreError::EditConflict` when no row matches.

use super::{
    MovieStore, PermissionStore, StoreError, TokenStore, UserStore, is_unique_violation,
    versioning::conditional_update, with_deadline,
};
use crate::{
    auth::{
        permissions::Permissions,
        token::{Scope, TokenRecord},
    },
    models::{Movie, MovieQuery, NewMovie, NewUser, Runtime, User},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        created_at: row.get("created_at"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        activated: row.get("activated"),
        version: row.get("version"),
    }
}

fn movie_from_row(row: &PgRow) -> Movie {
    Movie {
        id: row.get("id"),
        created_at: row.get("created_at"),
        title: row.get("title"),
        year: row.get("year"),
        runtime: Runtime(row.get("runtime")),
        genres: row.get("genres"),
        version: row.get("version"),
    }
}

fn duplicate_email(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::DuplicateEmail
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let query = r"
            INSERT INTO users (name, email, password_hash, activated)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = with_deadline(
            "INSERT users",
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .fetch_one(&self.pool)
                .instrument(span),
        )
        .await
        .map_err(|err| match err {
            StoreError::Database(err) => duplicate_email(err),
            other => other,
        })?;

        Ok(User {
            id: row.get("id"),
            created_at: row.get("created_at"),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: row.get("version"),
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT id, created_at, name, email::text AS email, password_hash, activated, version
            FROM users
            WHERE email = $1::citext
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = with_deadline(
            "SELECT users",
            sqlx::query(query)
                .bind(email)
                .fetch_optional(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let query = r"
            UPDATE users
            SET name = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = with_deadline(
            "UPDATE users",
            sqlx::query(query)
                .bind(&user.name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(user.activated)
                .bind(user.id)
                .bind(user.version)
                .fetch_optional(&self.pool)
                .instrument(span),
        )
        .await
        .map_err(|err| match err {
            StoreError::Database(err) => duplicate_email(err),
            other => other,
        })?;
        conditional_update(user, row.map(|row| row.get("version")))
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert(&self, token: &TokenRecord) -> Result<(), StoreError> {
        let query = "INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        with_deadline(
            "INSERT tokens",
            sqlx::query(query)
                .bind(&token.hash)
                .bind(token.user_id)
                .bind(token.expiry)
                .bind(token.scope.as_str())
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        let query = "DELETE FROM tokens WHERE scope = $1 AND user_id = $2";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        with_deadline(
            "DELETE tokens",
            sqlx::query(query)
                .bind(scope.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(())
    }

    async fn user_for_token(
        &self,
        scope: Scope,
        hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<User>, StoreError> {
        let query = r"
            SELECT users.id, users.created_at, users.name, users.email::text AS email,
                   users.password_hash, users.activated, users.version
            FROM users
            INNER JOIN tokens ON users.id = tokens.user_id
            WHERE tokens.hash = $1
              AND tokens.scope = $2
              AND tokens.expiry > $3
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = with_deadline(
            "SELECT tokens",
            sqlx::query(query)
                .bind(hash)
                .bind(scope.as_str())
                .bind(now)
                .fetch_optional(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        let query = r"
            SELECT permissions.code
            FROM permissions
            INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
            WHERE users_permissions.user_id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = with_deadline(
            "SELECT permissions",
            sqlx::query(query)
                .bind(user_id)
                .fetch_all(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.get::<String, _>("code"))
            .collect())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO users_permissions
            SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        with_deadline(
            "INSERT users_permissions",
            sqlx::query(query)
                .bind(user_id)
                .bind(codes)
                .execute(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MovieStore for PgStore {
    async fn insert(&self, movie: NewMovie) -> Result<Movie, StoreError> {
        let query = r"
            INSERT INTO movies (title, year, runtime, genres)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at, version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = with_deadline(
            "INSERT movies",
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .fetch_one(&self.pool)
                .instrument(span),
        )
        .await?;

        Ok(Movie {
            id: row.get("id"),
            created_at: row.get("created_at"),
            title: movie.title,
            year: movie.year,
            runtime: movie.runtime,
            genres: movie.genres,
            version: row.get("version"),
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        if id < 1 {
            return Ok(None);
        }
        let query = r"
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = with_deadline(
            "SELECT movies",
            sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(row.as_ref().map(movie_from_row))
    }

    async fn list(&self, query: &MovieQuery) -> Result<Vec<Movie>, StoreError> {
        // Column and direction come from `SortOrder`, which only holds safelisted values.
        let statement = format!(
            r"
            SELECT id, created_at, title, year, runtime, genres, version
            FROM movies
            WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
              AND (genres @> $2 OR $2 = '{{}}')
            ORDER BY {} {}, id ASC
            LIMIT $3 OFFSET $4
            ",
            query.sort.column,
            query.sort.direction.as_sql()
        );
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = statement.as_str()
        );
        let rows = with_deadline(
            "SELECT movies",
            sqlx::query(&statement)
                .bind(&query.title)
                .bind(&query.genres)
                .bind(query.limit)
                .bind(query.offset)
                .fetch_all(&self.pool)
                .instrument(span),
        )
        .await?;
        Ok(rows.iter().map(movie_from_row).collect())
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        let query = r"
            UPDATE movies
            SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING version
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = with_deadline(
            "UPDATE movies",
            sqlx::query(query)
                .bind(&movie.title)
                .bind(movie.year)
                .bind(movie.runtime.0)
                .bind(&movie.genres)
                .bind(movie.id)
                .bind(movie.version)
                .fetch_optional(&self.pool)
                .instrument(span),
        )
        .await?;
        conditional_update(movie, row.map(|row| row.get("version")))
    }
}
