//! # Lessonhub (music lesson marketplace backend)
//!
//! Parents find and book music teachers; teachers publish a listing with
//! their instruments, rates and lesson formats. Identity is delegated to a
//! hosted auth service and rows live in its Postgres database.
//!
//! ## Sign-up
//!
//! Registration creates the identity, signs it in, then writes the profile
//! row with a single idempotent upsert keyed by the identity id. A database
//! trigger may insert the same row first; the upsert settles both into one
//! row carrying the submitted names and role. Teachers also get an extension
//! row, created active and unverified.
//!
//! ## Sessions
//!
//! Each access token maps to a [`session::SessionContext`] that publishes a
//! snapshot of identity, profile and session. Auth events from
//! [`auth::AuthService`] are routed to the matching contexts; stale writes
//! are dropped by generation, so an older fetch can never overwrite a newer
//! snapshot.
//!
//! ## Routing
//!
//! Everything under `/app` is guarded: a pending snapshot answers
//! `503 Retry-After`, a signed-out one redirects to `/`, and `/app` itself
//! redirects to the dashboard for the user's role.

pub mod api;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod directory;
pub mod guard;
pub mod model;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
