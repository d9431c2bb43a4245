//! # schemapi-core — Foundational Types
//!
//! Leaf crate of the schemapi workspace. It defines the small set of types
//! every other crate agrees on:
//!
//! 1. **`Undefined`.** The "caller did not supply a value" sentinel. It is
//!    distinct from JSON `null`, compares by identity (there is only one
//!    value of the type), and refuses to be serialized.
//!
//! 2. **`InstancePath`.** A location inside a JSON document, rendered either
//!    as a JSON Pointer (`/encoding/x/scale/domain/2`) or in dotted form
//!    (`encoding.x.scale.domain[2]`) for diagnostics.
//!
//! 3. **`SchemaLoadError`.** The fatal error raised when a packaged schema
//!    document cannot be located or parsed.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `schemapi-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod path;
pub mod undefined;

pub use error::SchemaLoadError;
pub use path::{InstancePath, PathSegment};
pub use undefined::{Undefined, UNDEFINED};
