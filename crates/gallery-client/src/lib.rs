//! Gallery client coordination layer
//!
//! Everything between an outgoing API call and the token layer: the
//! single-flight refresh coordinator, the request interceptor pipeline,
//! the session state machine, and the auth event channel the presentation
//! layer subscribes to instead of being navigated from below.
//!
//! Request flow:
//! 1. A call enters `ApiClient::execute()`
//! 2. Pre-flight consults the stored pair's expiry; an expired access token
//!    with a usable refresh token joins `RefreshCoordinator::acquire_or_join()`
//! 3. The call goes out with `Authorization: Bearer <token>`
//! 4. A 401 response triggers at most one refresh-and-resend cycle
//! 5. Unrecoverable failures clear the store, emit `AuthEvent::SessionExpired`
//!    once, and surface as `Error::AuthenticationRequired`
//! 6. `SessionController` re-derives `Anonymous`/`Authenticated` from every
//!    store mutation, including those made by other browsing contexts

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod refresh;
pub mod session;
pub mod stack;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{AuthEvent, AuthEvents};
pub use refresh::RefreshCoordinator;
pub use session::{SessionController, SessionState, derive_state};
pub use stack::AuthStack;
