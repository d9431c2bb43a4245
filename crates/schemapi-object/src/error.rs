//! # Error Types
//!
//! [`SchemapiError`] is the error every public operation of this crate
//! returns. It aggregates the three failure classes a caller can meet:
//!
//! - schema load failures (fatal for the family),
//! - validation failures (fix the input and retry),
//! - dispatch failures (no registered class accepts a raw value; callers
//!   can fall back to an untyped object).

use schemapi_core::SchemaLoadError;
use schemapi_schema::ValidationError;
use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum SchemapiError {
    /// The packaged schema could not be loaded.
    #[error("schema load error: {0}")]
    Load(#[from] SchemaLoadError),

    /// The object does not conform to its schema.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// No registered class accepts a raw value.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The object was assembled in a way that cannot be serialized.
    #[error("construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchemapiError {
    /// The validation error, if this is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Misuse of the construction surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// More than one positional argument.
    #[error("{class} accepts at most one positional argument, got {count}")]
    TooManyPositional {
        /// Class name.
        class: String,
        /// Number of positional arguments passed.
        count: usize,
    },

    /// Both a positional value and keyword properties are set.
    #[error("{class} instance has both a value and properties; cannot serialize")]
    ValueAndProperties {
        /// Class name.
        class: String,
    },

    /// A raw value of the wrong shape for the class.
    #[error("{class} expects {expected}, got {found}")]
    Shape {
        /// Class name.
        class: String,
        /// What the class needs.
        expected: String,
        /// What was supplied.
        found: String,
    },

    /// A NaN or infinite float, which JSON cannot represent.
    #[error("{value} is not a finite number and cannot be serialized")]
    NonFiniteNumber {
        /// The float as Rust prints it (`NaN`, `inf`, `-inf`).
        value: String,
    },
}

/// Failure to match a raw value to a registered class.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every candidate rejected the value.
    #[error("no schema in family '{family}' accepts the value ({tried} candidates tried){}", nearest_hint(.nearest))]
    NoMatch {
        /// Family name.
        family: String,
        /// Number of candidate classes.
        tried: usize,
        /// The candidate that came closest and why it rejected the value.
        nearest: Option<(String, ValidationError)>,
    },

    /// A class from another family was registered.
    #[error("class '{class}' belongs to family '{actual}', not '{expected}'")]
    ForeignClass {
        /// Class name.
        class: String,
        /// Registry family.
        expected: String,
        /// The class's own family.
        actual: String,
    },

    /// A typed tree nested deeper than the registry allows.
    #[error("value in family '{family}' nests deeper than {max_depth} schema levels")]
    RecursionLimit {
        /// Family name.
        family: String,
        /// The registry's bound.
        max_depth: usize,
    },

    /// The family schema failed to load.
    #[error("{0}")]
    Load(#[from] SchemaLoadError),
}

fn nearest_hint(nearest: &Option<(String, ValidationError)>) -> String {
    match nearest {
        Some((class, err)) => match err.primary() {
            Some(v) => format!("; nearest is {class}: {}: {}", v.instance_path, v.message),
            None => format!("; nearest is {class}"),
        },
        None => String::new(),
    }
}
