//! # Schema Load Errors
//!
//! A packaged schema document that is missing or malformed makes its whole
//! schema family unusable, so these errors are fatal for that family. They
//! are `Clone` because a family caches the outcome of its one-time load and
//! replays the same failure to every later caller.

use thiserror::Error;

/// Failure to load or compile a root schema document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaLoadError {
    /// The schema resource could not be located or read.
    #[error("schema family '{family}': cannot read '{location}': {reason}")]
    NotFound {
        /// Schema family name.
        family: String,
        /// Path or resource name that was tried.
        location: String,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The schema resource is not valid JSON (or YAML).
    #[error("schema family '{family}': invalid document: {reason}")]
    Parse {
        /// Schema family name.
        family: String,
        /// Parser message.
        reason: String,
    },

    /// The document parsed but is not a usable schema, e.g. a dangling
    /// `$ref` or a `pattern` that is not a valid regular expression.
    #[error("schema family '{family}': invalid schema at '{pointer}': {reason}")]
    InvalidSchema {
        /// Schema family name.
        family: String,
        /// JSON Pointer to the offending schema node.
        pointer: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SchemaLoadError {
    /// The schema family the error belongs to.
    pub fn family(&self) -> &str {
        match self {
            Self::NotFound { family, .. }
            | Self::Parse { family, .. }
            | Self::InvalidSchema { family, .. } => family,
        }
    }
}
