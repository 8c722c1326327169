use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;
use tracing::Level;

/// `-v` count (or `REELGATE_LOG_LEVEL`) to a tracing level; none means ERROR.
const fn verbosity_to_level(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, set up logging and return the action to run.
///
/// # Errors
///
/// Returns an error if telemetry cannot be initialized or the arguments do
/// not describe a runnable action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    let environment = matches
        .get_one::<String>(commands::ARG_ENV)
        .map_or("development", String::as_str);
    telemetry::init(verbosity_to_level(verbosity), environment)?;

    dispatch::handler(&matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_to_level(0), None);
        assert_eq!(verbosity_to_level(1), Some(Level::WARN));
        assert_eq!(verbosity_to_level(2), Some(Level::INFO));
        assert_eq!(verbosity_to_level(3), Some(Level::DEBUG));
        assert_eq!(verbosity_to_level(4), Some(Level::TRACE));
        assert_eq!(verbosity_to_level(9), Some(Level::TRACE));
    }
}
