use clap::{builder::ValueParser, Arg, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ENV_LOG_LEVEL: &str = "LESSONHUB_LOG_LEVEL";

/// Accepts a level name or a numeric verbosity, as produced by `-v` counts.
fn parse_verbosity(level: &str) -> Result<u8, String> {
    if let Ok(parsed) = level.parse::<u8>() {
        return Ok(parsed);
    }

    match level.trim().to_lowercase().as_str() {
        "error" => Ok(0),
        "warn" => Ok(1),
        "info" => Ok(2),
        "debug" => Ok(3),
        "trace" => Ok(4),
        _ => Err(format!(
            "invalid log level {level:?}, expected error, warn, info, debug or trace"
        )),
    }
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_verbosity)
}

/// Tracing level selected by `-v` or `LESSONHUB_LOG_LEVEL`; `None` keeps the
/// default. A `-v` on the command line replaces the environment value.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    match matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env(ENV_LOG_LEVEL)
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
