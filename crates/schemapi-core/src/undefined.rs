//! # The `Undefined` Sentinel
//!
//! Marks a parameter the caller never supplied. Wrapper constructors default
//! every keyword to `Undefined`, and the serializer drops any property that
//! holds it, so "omitted" and "explicitly `null`" stay distinguishable all
//! the way to the JSON output.
//!
//! `Undefined` is a zero-sized type with exactly one value, [`UNDEFINED`].
//! Equality is therefore identity: every `Undefined` is the same sentinel.

use serde::ser::{Error as _, Serialize, Serializer};

/// The "no value supplied" marker.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Undefined;

/// The process-wide sentinel value.
pub const UNDEFINED: Undefined = Undefined;

impl std::fmt::Debug for Undefined {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Undefined")
    }
}

impl std::fmt::Display for Undefined {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Undefined")
    }
}

/// Serializing the sentinel is always a bug in the caller: properties that
/// hold it must be dropped before the output is produced.
impl Serialize for Undefined {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom(
            "Undefined is a sentinel and must never be serialized",
        ))
    }
}
