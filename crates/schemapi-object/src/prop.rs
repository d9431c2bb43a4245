//! # Property Values
//!
//! [`Prop`] is what a schema object stores per property: a raw JSON value,
//! a nested schema object, a list or map of either, or the [`Undefined`]
//! sentinel. Undefined is distinct from JSON `null`: a property set to
//! Undefined is treated as absent and never reaches serialized output.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use schemapi_core::Undefined;
use serde_json::{Map, Value};

use crate::error::ConstructionError;
use crate::object::SchemaObject;

/// A property value held by a [`SchemaObject`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Prop {
    /// Not set. Omitted from output.
    #[default]
    Undefined,
    /// A raw JSON value, `null` included.
    Json(Value),
    /// A list whose elements may be schema objects.
    List(Vec<Prop>),
    /// A string-keyed map whose values may be schema objects.
    Dict(BTreeMap<String, Prop>),
    /// A nested schema object.
    Object(Box<SchemaObject>),
    /// A NaN or infinite float. Kept so serialization can reject it.
    NonFinite(f64),
}

/// Shared Undefined for lookups of unset properties.
pub(crate) static UNDEFINED_PROP: Prop = Prop::Undefined;

impl Prop {
    /// Whether this is the Undefined sentinel.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The nested object, if this is one.
    pub fn as_object(&self) -> Option<&SchemaObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The raw JSON value, if this is one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Convert to plain JSON without validating nested objects.
    ///
    /// Returns `None` for Undefined. Undefined list elements and map
    /// values are dropped.
    ///
    /// # Errors
    ///
    /// A nested object that has both a positional value and properties,
    /// or a non-finite float anywhere in the value.
    pub fn to_value(&self) -> Result<Option<Value>, ConstructionError> {
        Ok(match self {
            Self::Undefined => None,
            Self::NonFinite(f) => {
                return Err(ConstructionError::NonFiniteNumber {
                    value: f.to_string(),
                })
            }
            Self::Json(v) => Some(v.clone()),
            Self::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = item.to_value()? {
                        out.push(v);
                    }
                }
                Some(Value::Array(out))
            }
            Self::Dict(map) => Some(Value::Object(dict_to_map(map, &[])?)),
            Self::Object(obj) => Some(obj.to_value()?),
        })
    }

    /// Repr-style rendering used by [`SchemaObject`]'s `Display`.
    pub(crate) fn write_repr(&self, out: &mut String, indent: usize) {
        match self {
            Self::Undefined => out.push_str("Undefined"),
            Self::Json(v) => out.push_str(&v.to_string()),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, indent);
                }
                out.push(']');
            }
            Self::Dict(map) => {
                out.push('{');
                for (i, (k, v)) in map.iter().filter(|(_, v)| !v.is_undefined()).enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{k:?}: ");
                    v.write_repr(out, indent);
                }
                out.push('}');
            }
            Self::Object(obj) => obj.write_repr(out, indent),
            Self::NonFinite(f) => {
                let _ = write!(out, "{f}");
            }
        }
    }
}

/// Serialize a property map, skipping Undefined values and `ignore`d keys.
pub(crate) fn dict_to_map(
    map: &BTreeMap<String, Prop>,
    ignore: &[String],
) -> Result<Map<String, Value>, ConstructionError> {
    let mut out = Map::new();
    for (key, prop) in map {
        if ignore.iter().any(|i| i == key) {
            continue;
        }
        if let Some(v) = prop.to_value()? {
            out.insert(key.clone(), v);
        }
    }
    Ok(out)
}

impl From<Undefined> for Prop {
    fn from(_: Undefined) -> Self {
        Self::Undefined
    }
}

impl From<Value> for Prop {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<SchemaObject> for Prop {
    fn from(obj: SchemaObject) -> Self {
        Self::Object(Box::new(obj))
    }
}

impl From<&str> for Prop {
    fn from(v: &str) -> Self {
        Self::Json(Value::String(v.to_string()))
    }
}

impl From<String> for Prop {
    fn from(v: String) -> Self {
        Self::Json(Value::String(v))
    }
}

macro_rules! json_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Prop {
                fn from(v: $t) -> Self {
                    Self::Json(Value::from(v))
                }
            }
        )*
    };
}

json_scalar!(bool, i32, i64, u32, u64, usize);

macro_rules! float_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Prop {
                fn from(v: $t) -> Self {
                    let f = f64::from(v);
                    serde_json::Number::from_f64(f).map_or(Self::NonFinite(f), |n| Self::Json(Value::Number(n)))
                }
            }
        )*
    };
}

float_scalar!(f32, f64);

/// `None` maps to Undefined, so optional arguments can be passed through.
impl<T: Into<Prop>> From<Option<T>> for Prop {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Undefined, Into::into)
    }
}

impl<T: Into<Prop>> From<Vec<T>> for Prop {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Prop>> From<BTreeMap<String, T>> for Prop {
    fn from(map: BTreeMap<String, T>) -> Self {
        Self::Dict(map.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
