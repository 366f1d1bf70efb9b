//! Common types for the gallery client workspace

mod secret;
mod error;

pub use secret::Secret;
pub use error::{Error, Result};
