use crate::backend::{memory, GoTrueProvider, IdentityProvider, PgStore, Store};
use crate::cli::commands::backend::Options;
use anyhow::Result;
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// How long the in-memory profile trigger lags behind sign-up.
const MEMORY_TRIGGER_DELAY: Duration = Duration::from_millis(200);

/// Open the identity provider and store selected on the command line.
///
/// # Errors
/// Returns an error if the auth URL is invalid or the database is unreachable.
pub async fn connect(
    backend: &Options,
    session_ttl: Duration,
) -> Result<(Arc<dyn IdentityProvider>, Arc<dyn Store>)> {
    match backend {
        Options::Supabase {
            auth_url,
            anon_key,
            dsn,
        } => {
            let identity = GoTrueProvider::new(auth_url, anon_key.clone())?;
            let store = PgStore::connect(dsn.expose_secret()).await?;
            info!(auth_url = %auth_url, "connected to hosted backend");
            Ok((Arc::new(identity), Arc::new(store)))
        }
        Options::Memory => {
            warn!("using the in-memory backend, all data is lost on exit");
            let (identity, store) = memory::pair(session_ttl, Some(MEMORY_TRIGGER_DELAY));
            Ok((identity, store))
        }
    }
}
