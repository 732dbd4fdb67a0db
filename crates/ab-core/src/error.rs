//! Framework error type.
//!
//! Sub-crates define their own error enums and wrap `AbError` as one
//! variant via `#[from]`.  `AbError` carries the schema-misuse part of the
//! taxonomy (lookups, type checks, reserved names) that every layer shares.

use thiserror::Error;

/// The top-level error type for `ab-core` and a common base for sub-crates.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AbError {
    #[error("{what} '{name}' not found")]
    NotFound { what: &'static str, name: String },

    #[error("type mismatch for '{name}': {detail}")]
    TypeMismatch { name: String, detail: String },

    #[error("{what} '{name}' is already declared")]
    DuplicateName { what: &'static str, name: String },

    #[error("name '{0}' begins with the reserved prefix '_'")]
    ReservedName(String),

    #[error("agent '{0}' is not part of the model")]
    InvalidAgent(String),

    #[error("agent '{agent}' has no state '{state}'")]
    InvalidState { agent: String, state: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} used before it was initialised")]
    NotInitialized(&'static str),
}

impl AbError {
    /// Shorthand for [`AbError::NotFound`].
    pub fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        AbError::NotFound { what, name: name.into() }
    }

    /// Shorthand for [`AbError::TypeMismatch`].
    pub fn type_mismatch(name: impl Into<String>, detail: impl Into<String>) -> Self {
        AbError::TypeMismatch { name: name.into(), detail: detail.into() }
    }
}

/// Shorthand result type for all `ab-*` crates.
pub type AbResult<T> = Result<T, AbError>;
