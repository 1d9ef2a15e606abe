use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_RECONCILE_DELAY_MS: &str = "reconcile-delay-ms";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_PUBLIC_URL: &str = "public-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub settle_delay: Duration,
    pub session_ttl_seconds: i64,
    pub public_url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is somehow absent.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let delay_ms = matches
            .get_one::<u64>(ARG_RECONCILE_DELAY_MS)
            .copied()
            .context("missing argument: --reconcile-delay-ms")?;
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing argument: --session-ttl-seconds")?;
        let public_url = matches
            .get_one::<String>(ARG_PUBLIC_URL)
            .cloned()
            .context("missing argument: --public-url")?;
        Ok(Self {
            settle_delay: Duration::from_millis(delay_ms),
            session_ttl_seconds,
            public_url,
        })
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.session_ttl_seconds).unwrap_or(0))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RECONCILE_DELAY_MS)
                .long(ARG_RECONCILE_DELAY_MS)
                .help("Milliseconds to wait after sign-up before writing the profile row")
                .env("LESSONHUB_RECONCILE_DELAY_MS")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("LESSONHUB_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..))
                .global(true),
        )
        .arg(
            Arg::new(ARG_PUBLIC_URL)
                .long(ARG_PUBLIC_URL)
                .help("Public base URL of the site; https enables Secure cookies")
                .env("LESSONHUB_PUBLIC_URL")
                .default_value("http://localhost:8080")
                .global(true),
        )
}
