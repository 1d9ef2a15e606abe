//! Command-line argument dispatch.
//!
//! Parses validated CLI arguments and maps them to the action to run: the
//! API server by default, or the teacher seed when its subcommand is given.

use crate::cli::actions::{seed, server, Action};
use crate::cli::commands::{self, auth, backend, CMD_SEED_TEACHERS};
use anyhow::Result;

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches(CMD_SEED_TEACHERS) {
        commands::validate(sub).map_err(|e| anyhow::anyhow!(e))?;
        return Ok(Action::SeedTeachers(seed::Args {
            backend: backend::Options::parse(sub)?,
            auth: auth::Options::parse(sub)?,
        }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    Ok(Action::Server(server::Args {
        port,
        backend: backend::Options::parse(matches)?,
        auth: auth::Options::parse(matches)?,
    }))
}
