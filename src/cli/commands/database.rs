use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_DSN: &str = "dsn";
pub const ARG_DB_MAX_CONNECTIONS: &str = "db-max-connections";
pub const ARG_DB_MIN_CONNECTIONS: &str = "db-min-connections";
pub const ARG_DB_ACQUIRE_TIMEOUT: &str = "db-acquire-timeout";

#[derive(Debug)]
pub struct Options {
    pub dsn: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the DSN is missing or blank.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .filter(|dsn| !dsn.trim().is_empty())
            .context("missing required argument: --dsn")?;

        Ok(Self {
            dsn,
            max_connections: matches
                .get_one::<u32>(ARG_DB_MAX_CONNECTIONS)
                .copied()
                .unwrap_or(25),
            min_connections: matches
                .get_one::<u32>(ARG_DB_MIN_CONNECTIONS)
                .copied()
                .unwrap_or(1),
            acquire_timeout_seconds: matches
                .get_one::<u64>(ARG_DB_ACQUIRE_TIMEOUT)
                .copied()
                .unwrap_or(5),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("PostgreSQL connection string")
                .env("REELGATE_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_DB_MAX_CONNECTIONS)
                .long(ARG_DB_MAX_CONNECTIONS)
                .help("Maximum open connections in the pool")
                .env("REELGATE_DB_MAX_CONNECTIONS")
                .default_value("25")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_DB_MIN_CONNECTIONS)
                .long(ARG_DB_MIN_CONNECTIONS)
                .help("Connections kept open while idle")
                .env("REELGATE_DB_MIN_CONNECTIONS")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_DB_ACQUIRE_TIMEOUT)
                .long(ARG_DB_ACQUIRE_TIMEOUT)
                .help("Seconds to wait for a pooled connection")
                .env("REELGATE_DB_ACQUIRE_TIMEOUT")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
