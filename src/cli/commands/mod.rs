pub mod database;
pub mod limiter;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_ENV: &str = "env";
pub const ARG_CORS_TRUSTED_ORIGINS: &str = "cors-trusted-origins";
pub const ARG_MAIL_SENDER: &str = "mail-sender";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("reelgate")
        .about("Movie catalogue API")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("4000")
                .env("REELGATE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENV)
                .long(ARG_ENV)
                .help("Deployment environment reported by the healthcheck")
                .default_value("development")
                .env("REELGATE_ENV")
                .value_parser(["development", "staging", "production"]),
        )
        .arg(
            Arg::new(ARG_CORS_TRUSTED_ORIGINS)
                .long(ARG_CORS_TRUSTED_ORIGINS)
                .help("Trusted CORS origins (space separated)")
                .env("REELGATE_CORS_TRUSTED_ORIGINS"),
        )
        .arg(
            Arg::new(ARG_MAIL_SENDER)
                .long(ARG_MAIL_SENDER)
                .help("From address for outgoing mail")
                .default_value("Reelgate <no-reply@reelgate.dev>")
                .env("REELGATE_MAIL_SENDER"),
        );

    let command = database::with_args(command);
    let command = limiter::with_args(command);
    logging::with_args(command)
}
