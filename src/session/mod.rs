//! Per-session view of the signed-in account.
//!
//! A [`SessionContext`] owns the latest [`Snapshot`] for one session token
//! and publishes it over a `watch` channel. The [`SessionRegistry`] keeps one
//! context per token and feeds them the auth events from
//! [`crate::auth::AuthService`].

mod context;
mod registry;

pub use context::{SessionContext, Snapshot, SnapshotWatcher};
pub use registry::SessionRegistry;
