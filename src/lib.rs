//! # Reelgate (Movie catalogue API)
//!
//! `reelgate` serves a movie catalogue over HTTP. Every request flows through
//! the same authorization pipeline before it reaches a handler:
//!
//! 1. **Rate limiting:** a per-client token bucket keyed by the peer address
//!    (or proxy headers, when trusted). Idle clients are swept out of memory by
//!    a background task.
//! 2. **Identification:** an `Authorization: Bearer <token>` header is resolved to
//!    a user through the token lifecycle manager. No header means anonymous.
//! 3. **Gating:** handlers declare the minimum stage they need (authenticated,
//!    activated, or a specific permission code) through extractors.
//!
//! ## Tokens
//!
//! Tokens are 26 character base32 strings. Only their SHA-256 hash is ever
//! persisted and the plaintext is handed back to the caller exactly once. Each
//! token carries a scope (`activation`, `authentication`, `password-reset`) so a
//! token minted for one purpose cannot be replayed for another.
//!
//! ## Concurrent updates
//!
//! Mutable records (users, movies) carry a `version` column. Updates are
//! conditional on the version read earlier; a concurrent writer that got there
//! first turns the slower update into an edit conflict (`409`).
//!
//! ## Metrics
//!
//! Request, response and processing-time counters plus runtime and pool gauges
//! are exposed in Prometheus text format on `GET /debug/vars`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod models;
pub mod rate_limit;
pub mod store;
pub mod validator;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
