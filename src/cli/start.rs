use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Main entry point for the CLI - builds and returns the Action
///
/// Telemetry is installed once the action is known, so exported spans and
/// log filters reflect the selected backend.
///
/// # Errors
///
/// Returns an error if argument parsing, action dispatch, or telemetry initialization fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let action = dispatch::handler(&matches)?;

    telemetry::init(
        commands::logging::level(&matches),
        &action.telemetry_context(),
    )?;

    Ok(action)
}
