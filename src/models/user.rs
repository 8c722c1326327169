use crate::validator::{Validator, matches_email};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;

/// A stored account. The password hash and version never leave the server.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

/// Fields needed to insert an account; the store assigns id, timestamp and version.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

pub fn validate_name(v: &mut Validator, name: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= 500,
        "name",
        "must not be more than 500 bytes long",
    );
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches_email(email), "email", "must be a valid email address");
}

/// Length bounds are in bytes; the upper bound keeps hashing cost predictable.
pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_json_hides_secrets() -> anyhow::Result<()> {
        let user = User {
            id: 7,
            created_at: Utc::now(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
            activated: false,
            version: 3,
        };
        let value = serde_json::to_value(&user)?;
        assert!(value.get("password_hash").is_none());
        assert!(value.get("version").is_none());
        assert_eq!(value["email"], "alice@example.com");
        Ok(())
    }

    #[test]
    fn password_bounds_are_bytes() {
        let mut v = Validator::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(
            v.errors().get("password").map(String::as_str),
            Some("must be at least 8 bytes long")
        );

        let mut v = Validator::new();
        validate_password_plaintext(&mut v, &"ä".repeat(37));
        assert_eq!(
            v.errors().get("password").map(String::as_str),
            Some("must not be more than 72 bytes long")
        );
    }

    #[test]
    fn email_and_name_checks() {
        let mut v = Validator::new();
        validate_name(&mut v, "");
        validate_email(&mut v, "nope");
        let errors = v.into_errors();
        assert_eq!(errors.get("name").map(String::as_str), Some("must be provided"));
        assert_eq!(
            errors.get("email").map(String::as_str),
            Some("must be a valid email address")
        );
    }
}
