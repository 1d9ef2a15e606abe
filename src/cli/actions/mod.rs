pub mod seed;
pub mod server;

use crate::cli::{commands::CMD_SEED_TEACHERS, telemetry::ServiceContext};

mod connect;
// The match over `Action` lives in `run` so this file stays small.
mod run;

pub use connect::connect;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    SeedTeachers(seed::Args),
}

impl Action {
    /// Telemetry description of this run.
    #[must_use]
    pub fn telemetry_context(&self) -> ServiceContext {
        match self {
            Self::Server(args) => ServiceContext::new("server", &args.backend, &args.auth),
            Self::SeedTeachers(args) => {
                ServiceContext::new(CMD_SEED_TEACHERS, &args.backend, &args.auth)
            }
        }
    }

    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{auth, backend};
    use secrecy::SecretString;
    use std::time::Duration;

    fn auth_options() -> auth::Options {
        auth::Options {
            settle_delay: Duration::ZERO,
            session_ttl_seconds: 3600,
            public_url: "https://lessonhub.dev".to_string(),
        }
    }

    #[test]
    fn telemetry_context_names_command_and_backend() {
        let server = Action::Server(server::Args {
            port: 8080,
            backend: backend::Options::Supabase {
                auth_url: "https://project.supabase.co".to_string(),
                anon_key: SecretString::from("anon".to_string()),
                dsn: SecretString::from("postgres://localhost/lessonhub".to_string()),
            },
            auth: auth_options(),
        });
        let context = server.telemetry_context();
        assert_eq!(context.command, "server");
        assert_eq!(context.backend, backend::BACKEND_SUPABASE);
        assert_eq!(context.auth_host.as_deref(), Some("project.supabase.co"));
        assert_eq!(context.public_url, "https://lessonhub.dev");

        let seed = Action::SeedTeachers(seed::Args {
            backend: backend::Options::Memory,
            auth: auth_options(),
        });
        let context = seed.telemetry_context();
        assert_eq!(context.command, CMD_SEED_TEACHERS);
        assert_eq!(context.backend, backend::BACKEND_MEMORY);
        assert_eq!(context.auth_host, None);
    }
}
