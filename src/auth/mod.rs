//! Account lifecycle on top of the identity provider and the store.
//!
//! [`AuthService`] validates input, calls the backends, makes sure a profile
//! row exists for every signed-in identity and publishes [`AuthEvent`]s for
//! session contexts to consume.

mod error;
mod events;
mod reconcile;
mod service;
mod validate;

pub use error::AuthError;
pub use events::AuthEvent;
pub use service::{AuthService, AuthSuccess, CurrentUser, DEFAULT_SETTLE_DELAY};
pub use validate::{SignInRequest, SignUpRequest};
