//! # schemapi-schema — Schema Registry & Validation
//!
//! Everything that needs a root schema document lives here.
//!
//! ## Registry (`registry`)
//!
//! A [`SchemaFamily`] is declared once, usually as a `static`, and loads
//! its document lazily on first access. The resulting [`RootSchema`] is
//! shared read-only by every class cut from that document.
//!
//! ## Graph (`graph`)
//!
//! [`SchemaGraph`] compiles the document into a flat arena of nodes with
//! integer handles. `$ref` targets are memoized by JSON Pointer, so a
//! reference visited thousands of times in a large document is resolved
//! once, and recursive definitions never recurse at compile time.
//!
//! ## Validation (`validate`)
//!
//! [`Validator`] checks instances against a node and returns a structured
//! [`ValidationError`]: one [`Violation`] per failed rule, each with the
//! instance path (`encoding.x.scale.domain[2]`), the schema pointer, and a
//! message. Failed `anyOf` unions report their closest alternative.
//!
//! ## Sources (`loader`)
//!
//! Embedded JSON, JSON/YAML files on disk, or an already-parsed value.

pub mod graph;
pub mod loader;
pub mod registry;
pub mod validate;

// Re-export primary types for ergonomic imports.
pub use graph::{Additional, Items, JsonType, Node, NodeId, SchemaGraph};
pub use loader::{SchemaSource, SourceFormat};
pub use registry::{RootSchema, SchemaFamily};
pub use validate::{
    ValidationError, Validator, ValidatorOptions, Violation, ViolationKind, DEFAULT_MAX_DEPTH,
};

pub use schemapi_core::{InstancePath, SchemaLoadError};
