//! Gallery token layer
//!
//! Leaf library for the gallery client's authentication plumbing: credential
//! pair model with expiry checks, a token store over an abstract key-value
//! backend, and the identity provider's token endpoint calls. This crate has
//! no coordination logic — single-flight refresh and request interception
//! live in `gallery-client`.
//!
//! Credential flow:
//! 1. `token::login()` exchanges username/password for a `TokenResponse`
//! 2. `TokenResponse::into_pair()` anchors relative expiries at receipt time
//! 3. The pair is persisted via `TokenStore::replace()` as one unit
//! 4. `token::refresh()` obtains a replacement pair before/after expiry
//! 5. `TokenStore::clear()` erases everything on logout or refresh failure

pub mod error;
pub mod pair;
pub mod store;
pub mod token;

pub use error::{Error, Result};
pub use pair::{CredentialPair, now_millis};
pub use store::{FileStorage, MemoryStorage, Storage, TokenStore};
pub use token::{TokenResponse, login, refresh};
