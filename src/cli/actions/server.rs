use crate::{
    api::{self, ApiState, CookieConfig},
    auth::AuthService,
    cli::{
        actions::connect,
        commands::{auth, backend},
    },
    session::SessionRegistry,
};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// How often expired session contexts are dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub backend: backend::Options,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the backend cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(port = args.port, settle_delay = ?args.auth.settle_delay, "starting server");

    let (identity, store) = connect(&args.backend, args.auth.session_ttl()).await?;

    let auth = Arc::new(AuthService::new(identity, store).with_settle_delay(args.auth.settle_delay));

    let sessions = Arc::new(SessionRegistry::new(auth));
    let _listener = sessions.spawn_listener();
    let _sweeper = sessions.spawn_sweeper(SWEEP_INTERVAL);

    let cookies = CookieConfig::new(args.auth.public_url)
        .with_session_ttl_seconds(args.auth.session_ttl_seconds);

    api::new(args.port, Arc::new(ApiState::new(sessions, cookies))).await
}
