//! # schemapi-object — Schema-Backed Data Objects
//!
//! The user-facing half of schemapi: objects whose shape is described by a
//! JSON Schema and that validate themselves on serialization.
//!
//! ## Classes (`class`)
//!
//! A [`SchemaClass`] is the static descriptor of one wrapper type: a name,
//! a [`SchemaFamily`](schemapi_schema::SchemaFamily), and the fragment of
//! the family's root document it validates against. Typed wrappers
//! implement [`SchemaWrapper`] and are usually declared with
//! [`schema_class!`].
//!
//! ## Objects (`object`, `prop`)
//!
//! [`SchemaObject`] holds either one positional value or a map of keyword
//! properties, each a [`Prop`]. Undefined properties never reach the
//! output of [`SchemaObject::to_dict`], which validates the result and
//! returns every violation with its instance path on failure.
//!
//! ## Dispatch (`dispatch`)
//!
//! [`ClassRegistry`] maps raw JSON back to the most specific registered
//! class and rebuilds typed object trees from parsed documents.
//!
//! ## Crate Policy
//!
//! - Every fallible operation returns a typed error; see [`SchemapiError`].
//! - Schema documents are loaded once per family and shared read-only.

pub mod class;
pub mod dispatch;
pub mod error;
pub mod macros;
pub mod object;
pub mod prop;

// Re-export primary types for ergonomic imports.
pub use class::{ClassKind, Fragment, SchemaClass, SchemaWrapper};
pub use dispatch::{ClassRegistry, Specificity};
pub use error::{ConstructionError, DispatchError, SchemapiError};
pub use object::{SchemaObject, SerializeOptions};
pub use prop::Prop;

pub use schemapi_core::{Undefined, UNDEFINED};
pub use schemapi_schema::{SchemaFamily, ValidationError, ValidatorOptions, Violation, ViolationKind};
