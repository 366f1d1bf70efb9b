//! Workspace-level error type
//!
//! The gallery crates keep their domain errors local (token-endpoint faults
//! in `gallery-auth`, pipeline faults in `gallery-client`); what they share
//! is reading client configuration off disk. This type covers that shared
//! slice: the file read, the TOML parse, and the field validation that runs
//! before a config is accepted.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A config field failed validation. `field` is the TOML key so the
    /// message points at the line to fix.
    #[error("invalid config field `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config file: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
