//! Turns validated command-line matches into the action to run.

use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, database, limiter},
};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(4000);
    let env = matches
        .get_one::<String>(commands::ARG_ENV)
        .cloned()
        .unwrap_or_else(|| "development".to_string());
    let cors_trusted_origins = matches
        .get_one::<String>(commands::ARG_CORS_TRUSTED_ORIGINS)
        .map(|origins| origins.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    let mail_sender = matches
        .get_one::<String>(commands::ARG_MAIL_SENDER)
        .cloned()
        .unwrap_or_default();

    let database = database::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        env,
        dsn: database.dsn,
        db_max_connections: database.max_connections,
        db_min_connections: database.min_connections,
        db_acquire_timeout_seconds: database.acquire_timeout_seconds,
        limiter: limiter::parse(matches),
        cors_trusted_origins,
        mail_sender,
    }))
}
