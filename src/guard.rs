//! Access rules for the authenticated area under `/app`.
//!
//! [`evaluate`] is a pure function of the request path and the caller's
//! [`Snapshot`]; the HTTP layer runs it on every request.

use crate::{model::Role, session::Snapshot};

pub const PROTECTED_ROOT: &str = "/app";
pub const SIGNED_OUT_REDIRECT: &str = "/";
pub const PARENT_DASHBOARD: &str = "/app/parent/dashboard";
pub const TEACHER_DASHBOARD: &str = "/app/teacher/dashboard";
pub const DEFAULT_DASHBOARD: &str = "/app/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// The session is still being resolved.
    Pending,
    Allow,
    Redirect(&'static str),
}

/// `/app` itself or anything below it. `/application` is not protected.
#[must_use]
pub fn is_protected(path: &str) -> bool {
    path == PROTECTED_ROOT
        || path
            .strip_prefix(PROTECTED_ROOT)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn is_root(path: &str) -> bool {
    path == PROTECTED_ROOT || path == "/app/"
}

/// Landing page for a signed-in user, by profile role.
#[must_use]
pub fn dashboard_path(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::Parent) => PARENT_DASHBOARD,
        Some(Role::Teacher) => TEACHER_DASHBOARD,
        _ => DEFAULT_DASHBOARD,
    }
}

#[must_use]
pub fn evaluate(path: &str, snapshot: &Snapshot) -> GuardDecision {
    if !is_protected(path) {
        return GuardDecision::Allow;
    }
    if snapshot.loading {
        return GuardDecision::Pending;
    }
    if snapshot.session.is_none() {
        return GuardDecision::Redirect(SIGNED_OUT_REDIRECT);
    }
    if is_root(path) {
        return GuardDecision::Redirect(dashboard_path(snapshot.role()));
    }
    GuardDecision::Allow
}
