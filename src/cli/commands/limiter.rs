use crate::rate_limit::RateLimitConfig;
use clap::{Arg, ArgMatches, Command, builder::ValueParser};

pub const ARG_LIMITER_RPS: &str = "limiter-rps";
pub const ARG_LIMITER_BURST: &str = "limiter-burst";
pub const ARG_LIMITER_ENABLED: &str = "limiter-enabled";
pub const ARG_LIMITER_TRUST_PROXY: &str = "limiter-trust-proxy";

/// Positive, finite requests per second.
fn validator_rps() -> ValueParser {
    ValueParser::from(|raw: &str| -> std::result::Result<f64, String> {
        match raw.parse::<f64>() {
            Ok(rps) if rps.is_finite() && rps > 0.0 => Ok(rps),
            _ => Err(format!("must be a positive number: {raw}")),
        }
    })
}

/// Build the limiter settings, falling back to the defaults for anything unset.
#[must_use]
pub fn parse(matches: &ArgMatches) -> RateLimitConfig {
    let mut config = RateLimitConfig::new();
    if let Some(rps) = matches.get_one::<f64>(ARG_LIMITER_RPS) {
        config = config.with_rps(*rps);
    }
    if let Some(burst) = matches.get_one::<u32>(ARG_LIMITER_BURST) {
        config = config.with_burst(*burst);
    }
    if let Some(enabled) = matches.get_one::<bool>(ARG_LIMITER_ENABLED) {
        config = config.with_enabled(*enabled);
    }
    if let Some(trust_proxy) = matches.get_one::<bool>(ARG_LIMITER_TRUST_PROXY) {
        config = config.with_trust_proxy(*trust_proxy);
    }
    config
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LIMITER_RPS)
                .long(ARG_LIMITER_RPS)
                .help("Rate limiter maximum requests per second")
                .env("REELGATE_LIMITER_RPS")
                .default_value("2")
                .value_parser(validator_rps()),
        )
        .arg(
            Arg::new(ARG_LIMITER_BURST)
                .long(ARG_LIMITER_BURST)
                .help("Rate limiter maximum burst")
                .env("REELGATE_LIMITER_BURST")
                .default_value("4")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LIMITER_ENABLED)
                .long(ARG_LIMITER_ENABLED)
                .help("Enable the per-client rate limiter")
                .env("REELGATE_LIMITER_ENABLED")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_LIMITER_TRUST_PROXY)
                .long(ARG_LIMITER_TRUST_PROXY)
                .help("Key clients on X-Forwarded-For/X-Real-IP (only behind a proxy that overwrites them)")
                .env("REELGATE_LIMITER_TRUST_PROXY")
                .default_value("false")
                .value_parser(clap::value_parser!(bool)),
        )
}
