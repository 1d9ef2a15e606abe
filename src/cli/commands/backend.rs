//! Which identity provider and store the process talks to.

use anyhow::{anyhow, Result};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_BACKEND: &str = "backend";
pub const ARG_AUTH_URL: &str = "auth-url";
pub const ARG_ANON_KEY: &str = "anon-key";
pub const ARG_DSN: &str = "dsn";

pub const BACKEND_SUPABASE: &str = "supabase";
pub const BACKEND_MEMORY: &str = "memory";

#[derive(Debug, Clone)]
pub enum Options {
    /// Hosted auth API plus its Postgres database.
    Supabase {
        auth_url: String,
        anon_key: SecretString,
        dsn: SecretString,
    },
    /// Everything in process; state is lost on exit.
    Memory,
}

impl Options {
    /// # Errors
    /// Returns an error when the hosted backend is selected without its
    /// connection settings.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let backend = matches
            .get_one::<String>(ARG_BACKEND)
            .map_or(BACKEND_SUPABASE, String::as_str);

        if backend == BACKEND_MEMORY {
            return Ok(Self::Memory);
        }

        let required = |name: &str| {
            matches
                .get_one::<String>(name)
                .cloned()
                .ok_or_else(|| anyhow!("missing required argument: --{name}"))
        };

        Ok(Self::Supabase {
            auth_url: required(ARG_AUTH_URL)?,
            anon_key: SecretString::from(required(ARG_ANON_KEY)?),
            dsn: SecretString::from(required(ARG_DSN)?),
        })
    }

    /// The `--backend` value this configuration stands for.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Supabase { .. } => BACKEND_SUPABASE,
            Self::Memory => BACKEND_MEMORY,
        }
    }

    /// Host of the hosted auth API.
    #[must_use]
    pub fn auth_host(&self) -> Option<String> {
        match self {
            Self::Supabase { auth_url, .. } => Url::parse(auth_url)
                .ok()?
                .host_str()
                .map(ToString::to_string),
            Self::Memory => None,
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND)
                .long(ARG_BACKEND)
                .help("Identity and storage backend")
                .env("LESSONHUB_BACKEND")
                .default_value(BACKEND_SUPABASE)
                .value_parser(PossibleValuesParser::new([BACKEND_SUPABASE, BACKEND_MEMORY]))
                .global(true),
        )
        .arg(
            Arg::new(ARG_AUTH_URL)
                .long(ARG_AUTH_URL)
                .help("Project URL of the hosted auth API, example: https://<project>.supabase.co")
                .env("LESSONHUB_AUTH_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_ANON_KEY)
                .long(ARG_ANON_KEY)
                .help("Public anon key sent as the apikey header")
                .env("LESSONHUB_ANON_KEY")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("LESSONHUB_DSN")
                .hide_env_values(true)
                .global(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_auth_host() {
        let hosted = Options::Supabase {
            auth_url: "https://project.supabase.co/".to_string(),
            anon_key: SecretString::from("anon".to_string()),
            dsn: SecretString::from("postgres://localhost/lessonhub".to_string()),
        };
        assert_eq!(hosted.kind(), BACKEND_SUPABASE);
        assert_eq!(hosted.auth_host().as_deref(), Some("project.supabase.co"));

        assert_eq!(Options::Memory.kind(), BACKEND_MEMORY);
        assert_eq!(Options::Memory.auth_host(), None);
    }
}
