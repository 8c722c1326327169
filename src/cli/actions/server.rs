use crate::{
    api::{self, ServerConfig},
    cli::telemetry,
    rate_limit::RateLimitConfig,
};
use anyhow::Result;
use secrecy::SecretString;
use std::fmt::Write as _;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub env: String,
    pub dsn: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_seconds: u64,
    pub limiter: RateLimitConfig,
    pub cors_trusted_origins: Vec<String>,
    pub mail_sender: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig::new(self.port, SecretString::from(self.dsn))
            .with_env(self.env)
            .with_db_max_connections(self.db_max_connections)
            .with_db_min_connections(self.db_min_connections)
            .with_db_acquire_timeout_seconds(self.db_acquire_timeout_seconds)
            .with_limiter(self.limiter.normalize())
            .with_cors_trusted_origins(self.cors_trusted_origins)
            .with_mail_sender(self.mail_sender)
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let result = api::new(args.into_config()).await;
    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let limiter = if args.limiter.enabled() {
        format!(
            "{} rps, burst {}, keyed on {}",
            args.limiter.rps(),
            args.limiter.burst(),
            if args.limiter.trust_proxy() {
                "proxy headers"
            } else {
                "peer address"
            }
        )
    } else {
        "disabled".to_string()
    };
    let origins = if args.cors_trusted_origins.is_empty() {
        "none".to_string()
    } else {
        args.cors_trusted_origins.join(" ")
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("env", args.env.clone()),
        ("dsn", redact_dsn(&args.dsn)),
        (
            "db_pool",
            format!(
                "{}..={} (acquire timeout {}s)",
                args.db_min_connections, args.db_max_connections, args.db_acquire_timeout_seconds
            ),
        ),
        ("limiter", limiter),
        ("cors_trusted_origins", origins),
        ("mail_sender", args.mail_sender.clone()),
    ];

    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\nStartup configuration:", banner());
    for (key, value) in &entries {
        let _ = write!(message, "\n  {key:<width$}  {value}");
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn banner() -> String {
    BANNER.replace(
        "{VERSION}",
        &format!(
            "{} - {}",
            env!("CARGO_PKG_VERSION"),
            short_commit(crate::GIT_COMMIT_HASH)
        ),
    )
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

const BANNER: &str = r"
  .---------------.
  | R E E L       |
  |     G A T E   |
  '---------------'
  {VERSION}";
