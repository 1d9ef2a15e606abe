pub mod auth;
pub mod backend;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

use self::backend::{ARG_ANON_KEY, ARG_AUTH_URL, ARG_BACKEND, ARG_DSN, BACKEND_SUPABASE};

pub const CMD_SEED_TEACHERS: &str = "seed-teachers";

/// Validate that the hosted backend has everything it needs to connect.
///
/// # Errors
/// Returns an error string naming the first missing argument.
pub fn validate(matches: &clap::ArgMatches) -> Result<(), String> {
    let backend = matches
        .get_one::<String>(ARG_BACKEND)
        .map_or(BACKEND_SUPABASE, String::as_str);

    if backend == BACKEND_SUPABASE {
        for arg in [ARG_AUTH_URL, ARG_ANON_KEY, ARG_DSN] {
            if !matches.contains_id(arg) {
                return Err(format!(
                    "Missing required argument: --{arg} (required for the {BACKEND_SUPABASE} backend)"
                ));
            }
        }
    }
    Ok(())
}

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

    let command = Command::new("lessonhub")
        .about("Music lesson marketplace")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("LESSONHUB_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .subcommand(
            Command::new(CMD_SEED_TEACHERS)
                .about("Register the sample teacher accounts and fill in their listings"),
        );

    let command = backend::with_args(command);
    let command = auth::with_args(command);
    logging::with_args(command)
}
