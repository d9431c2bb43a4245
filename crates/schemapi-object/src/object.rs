//! # Schema Objects
//!
//! [`SchemaObject`] is the dynamic base every wrapper class delegates to.
//! An object holds either one positional value (for classes whose schema
//! is not an object, such as enums) or a map of keyword properties, never
//! both. Properties set to [`Undefined`](schemapi_core::Undefined) are
//! removed, so they never appear in output.
//!
//! Serialization validates the outermost object against its class schema.
//! Nested objects are serialized without validating them individually,
//! since the enclosing schema already covers them.
//!
//! ```text
//! SchemaObject::new(&AGGREGATED_FIELD_DEF)
//!     .with("op", "sum")
//!     .with("field", "x")
//!     .with("as", "total")
//!     .to_dict()?  // {"op": "sum", "field": "x", "as": "total"}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use schemapi_core::InstancePath;
use serde::Deserialize;
use serde_json::Value;

use crate::class::{ClassKind, SchemaClass};
use crate::error::{ConstructionError, SchemapiError};
use crate::prop::{dict_to_map, Prop, UNDEFINED_PROP};

/// Serialization options for [`SchemaObject::to_dict_with`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializeOptions {
    /// Validate the result against the class schema.
    pub validate: bool,
    /// Top-level keys to leave out.
    pub ignore: Vec<String>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            ignore: Vec::new(),
        }
    }
}

impl SerializeOptions {
    /// Options that skip validation.
    pub fn unchecked() -> Self {
        Self {
            validate: false,
            ..Self::default()
        }
    }
}

/// A schema-backed data object.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    class: &'static SchemaClass,
    value: Prop,
    props: BTreeMap<String, Prop>,
}

impl SchemaObject {
    /// An empty instance of `class`.
    pub fn new(class: &'static SchemaClass) -> Self {
        Self {
            class,
            value: Prop::Undefined,
            props: BTreeMap::new(),
        }
    }

    /// An instance holding a single positional value.
    pub fn from_value(class: &'static SchemaClass, value: impl Into<Prop>) -> Self {
        Self {
            value: value.into(),
            ..Self::new(class)
        }
    }

    /// Construct from positional and keyword arguments.
    ///
    /// # Errors
    ///
    /// More than one positional argument, or a positional argument mixed
    /// with keyword properties.
    pub fn construct<K: Into<String>>(
        class: &'static SchemaClass,
        args: Vec<Prop>,
        kwargs: impl IntoIterator<Item = (K, Prop)>,
    ) -> Result<Self, ConstructionError> {
        if args.len() > 1 {
            return Err(ConstructionError::TooManyPositional {
                class: class.name().to_string(),
                count: args.len(),
            });
        }
        let mut obj = Self::new(class);
        obj.extend(kwargs);
        if let Some(value) = args.into_iter().next() {
            if !obj.props.is_empty() && !value.is_undefined() {
                return Err(ConstructionError::ValueAndProperties {
                    class: class.name().to_string(),
                });
            }
            obj.value = value;
        }
        Ok(obj)
    }

    /// Builder form of [`SchemaObject::set`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Prop>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a property. Setting Undefined removes it.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Prop>) {
        let name = name.into();
        match value.into() {
            Prop::Undefined => {
                self.props.remove(&name);
            }
            value => {
                self.props.insert(name, value);
            }
        }
    }

    /// Remove a property, returning its old value (Undefined if unset).
    pub fn unset(&mut self, name: &str) -> Prop {
        self.props.remove(name).unwrap_or_default()
    }

    /// Set several properties at once.
    pub fn extend<K: Into<String>>(&mut self, kwargs: impl IntoIterator<Item = (K, Prop)>) {
        for (k, v) in kwargs {
            self.set(k, v);
        }
    }

    /// The value of a property; Undefined if unset.
    pub fn get(&self, name: &str) -> &Prop {
        self.props.get(name).unwrap_or(&UNDEFINED_PROP)
    }

    /// Whether a property is set.
    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Names of the properties that are set, sorted.
    pub fn property_names(&self) -> Vec<&str> {
        self.props.keys().map(String::as_str).collect()
    }

    /// Every property name the class declares plus any set extras, sorted
    /// and de-duplicated.
    ///
    /// # Errors
    ///
    /// The family's load error.
    pub fn dir(&self) -> Result<Vec<String>, SchemapiError> {
        let mut names = self.class.property_names()?;
        names.extend(self.props.keys().cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// The positional value; Undefined if none.
    pub fn value(&self) -> &Prop {
        &self.value
    }

    /// Iterate over set properties.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.props.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The class descriptor.
    pub fn class(&self) -> &'static SchemaClass {
        self.class
    }

    /// The class name.
    pub fn class_name(&self) -> &'static str {
        self.class.name()
    }

    /// Plain JSON for this object without validation.
    ///
    /// # Errors
    ///
    /// `ConstructionError::ValueAndProperties` anywhere in the tree.
    pub fn to_value(&self) -> Result<Value, ConstructionError> {
        self.raw(&[])
    }

    fn raw(&self, ignore: &[String]) -> Result<Value, ConstructionError> {
        if self.value.is_undefined() {
            return Ok(Value::Object(dict_to_map(&self.props, ignore)?));
        }
        if !self.props.is_empty() {
            return Err(ConstructionError::ValueAndProperties {
                class: self.class.name().to_string(),
            });
        }
        // Positional Undefined was handled above, so this always yields.
        Ok(self.value.to_value()?.unwrap_or(Value::Null))
    }

    /// Serialize and validate.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Validation` with the full structured error if the
    /// result does not conform, `SchemapiError::Construction` for objects
    /// that mix a positional value with properties, or the family's load
    /// error.
    pub fn to_dict(&self) -> Result<Value, SchemapiError> {
        self.to_dict_with(&SerializeOptions::default())
    }

    /// Serialize with explicit options.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::to_dict`].
    pub fn to_dict_with(&self, options: &SerializeOptions) -> Result<Value, SchemapiError> {
        let value = self.raw(&options.ignore)?;
        if options.validate {
            self.class.validate_value(&value)?;
        }
        Ok(value)
    }

    /// Serialize to JSON text, pretty-printed when `indent` is given.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::to_dict`].
    pub fn to_json(&self, indent: Option<usize>) -> Result<String, SchemapiError> {
        let value = self.to_dict()?;
        match indent {
            None => Ok(serde_json::to_string(&value)?),
            Some(width) => {
                let indent = vec![b' '; width];
                let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
                let mut buf = Vec::new();
                let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
                serde::Serialize::serialize(&value, &mut ser)?;
                // serde_json only ever writes UTF-8.
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
        }
    }

    /// Validate the whole object against its class schema.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::to_dict`].
    pub fn validate(&self) -> Result<(), SchemapiError> {
        self.to_dict().map(|_| ())
    }

    /// Validate a candidate value for one property without setting it.
    ///
    /// Undeclared names pass unless the schema forbids additional
    /// properties.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Validation` rooted at the property name.
    pub fn validate_property(&self, name: &str, value: impl Into<Prop>) -> Result<(), SchemapiError> {
        let Some(value) = value.into().to_value()? else {
            return Ok(());
        };
        let root = self.class.get_root_schema()?;
        let graph = root.graph();
        let schema = graph.node(graph.resolve(self.class.node()?));
        let result = match schema.as_ref().and_then(|n| n.property(name)) {
            Some(id) => root
                .validator()
                .validate(id, &value)
                .map_err(|e| e.prefixed(&InstancePath::root().child_key(name))),
            None => {
                // Only additionalProperties / patternProperties can object.
                let shell = graph.compile_fragment(&schema_without_required(schema.as_deref()))?;
                let mut candidate = serde_json::Map::new();
                candidate.insert(name.to_string(), value);
                root.validator().validate(shell, &Value::Object(candidate))
            }
        };
        result.map_err(|mut e| {
            e.schema = self.class.name().to_string();
            SchemapiError::from(e)
        })
    }

    /// Build an instance from a raw JSON value without wrapping nested
    /// values in typed classes.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Validation` when `validate` is set and the value
    /// does not conform; `ConstructionError::Shape` when an object class is
    /// given a non-object value.
    pub fn from_dict(
        class: &'static SchemaClass,
        value: &Value,
        validate: bool,
    ) -> Result<Self, SchemapiError> {
        if validate {
            class.validate_value(value)?;
        }
        match (class.kind(), value) {
            (_, Value::Object(map)) => {
                let mut obj = Self::new(class);
                for (k, v) in map {
                    obj.set(k.clone(), v.clone());
                }
                Ok(obj)
            }
            (ClassKind::Value, other) => Ok(Self::from_value(class, other.clone())),
            (ClassKind::Object, other) => Err(ConstructionError::Shape {
                class: class.name().to_string(),
                expected: "an object".into(),
                found: schemapi_schema::JsonType::of(other).to_string(),
            }
            .into()),
        }
    }

    /// Parse JSON text and build an instance with [`SchemaObject::from_dict`].
    ///
    /// # Errors
    ///
    /// `SchemapiError::Serialization` for malformed text, otherwise as
    /// [`SchemaObject::from_dict`].
    pub fn from_json(
        class: &'static SchemaClass,
        text: &str,
        validate: bool,
    ) -> Result<Self, SchemapiError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_dict(class, &value, validate)
    }

    pub(crate) fn set_value(&mut self, value: Prop) {
        self.value = value;
    }

    pub(crate) fn write_repr(&self, out: &mut String, indent: usize) {
        out.push_str(self.class.name());
        out.push('(');
        if !self.value.is_undefined() {
            self.value.write_repr(out, indent);
        } else if self.props.is_empty() {
            out.push_str("{}");
        } else {
            let pad = "  ".repeat(indent + 1);
            out.push_str("{\n");
            for (i, (k, v)) in self.props.iter().enumerate() {
                if i > 0 {
                    out.push_str(",\n");
                }
                out.push_str(&pad);
                out.push_str(k);
                out.push_str(": ");
                v.write_repr(out, indent + 1);
            }
            out.push('\n');
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
        out.push(')');
    }
}

/// The node's own object rules minus `required`, so a single candidate
/// property can be checked against `additionalProperties` and
/// `patternProperties` in isolation.
fn schema_without_required(node: Option<&schemapi_schema::Node>) -> Value {
    let mut shell = serde_json::Map::new();
    if let Some(Value::Object(raw)) = node.map(|n| &n.raw) {
        for key in ["properties", "patternProperties", "additionalProperties"] {
            if let Some(v) = raw.get(key) {
                shell.insert(key.to_string(), v.clone());
            }
        }
    }
    Value::Object(shell)
}

impl PartialEq for SchemaObject {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.value == other.value && self.props == other.props
    }
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Fragment;
    use schemapi_core::UNDEFINED;
    use schemapi_schema::{SchemaFamily, ViolationKind};
    use serde_json::json;

    static TOY: SchemaFamily = SchemaFamily::embedded(
        "toy",
        r##"{
            "definitions": {
                "FieldDef": {
                    "type": "object",
                    "properties": {
                        "field": {"type": "string"},
                        "op": {"$ref": "#/definitions/Op"},
                        "as": {"type": "string"}
                    },
                    "required": ["field"],
                    "additionalProperties": false
                },
                "Open": {"type": "object", "properties": {"a": {"type": "integer"}}},
                "Op": {"enum": ["sum", "mean"]},
                "Empty": {"type": "object"}
            }
        }"##,
    );

    static FIELD_DEF: SchemaClass =
        SchemaClass::new("FieldDef", &TOY, Fragment::Definition("FieldDef"), ClassKind::Object);
    static OPEN: SchemaClass =
        SchemaClass::new("Open", &TOY, Fragment::Definition("Open"), ClassKind::Object);
    static OP: SchemaClass = SchemaClass::new("Op", &TOY, Fragment::Definition("Op"), ClassKind::Value);
    static EMPTY: SchemaClass =
        SchemaClass::new("Empty", &TOY, Fragment::Definition("Empty"), ClassKind::Object);

    #[test]
    fn test_empty_object_serializes_to_empty_map() {
        assert_eq!(SchemaObject::new(&EMPTY).to_dict().unwrap(), json!({}));
    }

    #[test]
    fn test_undefined_kwarg_absent() {
        let obj = SchemaObject::new(&FIELD_DEF)
            .with("field", "x")
            .with("op", UNDEFINED);
        assert_eq!(obj.to_dict().unwrap(), json!({"field": "x"}));
        assert!(obj.get("op").is_undefined());
        assert!(!obj.contains("op"));
    }

    #[test]
    fn test_keyword_property_named_as() {
        let obj = SchemaObject::new(&FIELD_DEF)
            .with("op", "sum")
            .with("field", "x")
            .with("as", "total");
        assert_eq!(
            obj.to_dict().unwrap(),
            json!({"op": "sum", "field": "x", "as": "total"})
        );
    }

    #[test]
    fn test_positional_value() {
        let op = SchemaObject::from_value(&OP, "mean");
        assert_eq!(op.to_dict().unwrap(), json!("mean"));
        let err = SchemaObject::from_value(&OP, "median").to_dict().unwrap_err();
        let primary = err.as_validation().unwrap().primary().unwrap().clone();
        assert!(matches!(primary.kind, ViolationKind::Enum { .. }));
        assert!(primary.message.contains(r#""sum", "mean""#));
    }

    #[test]
    fn test_nested_object_serialized() {
        let obj = SchemaObject::new(&FIELD_DEF)
            .with("field", "x")
            .with("op", SchemaObject::from_value(&OP, "sum"));
        assert_eq!(obj.to_dict().unwrap(), json!({"field": "x", "op": "sum"}));
    }

    #[test]
    fn test_construct_rejects_two_positionals() {
        let err = SchemaObject::construct::<String>(&OP, vec!["sum".into(), "mean".into()], [])
            .unwrap_err();
        assert!(matches!(err, ConstructionError::TooManyPositional { count: 2, .. }));
    }

    #[test]
    fn test_construct_rejects_mixed() {
        let err = SchemaObject::construct(&OPEN, vec![Prop::from(1)], [("a", Prop::from(2))])
            .unwrap_err();
        assert!(matches!(err, ConstructionError::ValueAndProperties { .. }));
    }

    #[test]
    fn test_nan_property_fails_instead_of_null() {
        let obj = SchemaObject::new(&OPEN).with("a", f64::NAN);
        assert!(matches!(
            obj.to_dict().unwrap_err(),
            SchemapiError::Construction(ConstructionError::NonFiniteNumber { .. })
        ));
        assert!(obj.to_string().contains("NaN"));
    }

    #[test]
    fn test_value_and_properties_cannot_serialize() {
        let mut obj = SchemaObject::from_value(&OPEN, json!({"a": 1}));
        obj.set("a", 2);
        assert!(matches!(
            obj.to_dict().unwrap_err(),
            SchemapiError::Construction(ConstructionError::ValueAndProperties { .. })
        ));
    }

    #[test]
    fn test_validation_failure_is_reported() {
        let err = SchemaObject::new(&FIELD_DEF).with("op", "sum").to_dict().unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.schema, "FieldDef");
        assert!(matches!(
            validation.primary().unwrap().kind,
            ViolationKind::Required { .. }
        ));
    }

    #[test]
    fn test_to_dict_with_options() {
        let obj = SchemaObject::new(&FIELD_DEF).with("op", "bogus");
        let unchecked = obj.to_dict_with(&SerializeOptions::unchecked()).unwrap();
        assert_eq!(unchecked, json!({"op": "bogus"}));
        let options = SerializeOptions {
            validate: false,
            ignore: vec!["op".into()],
        };
        assert_eq!(obj.to_dict_with(&options).unwrap(), json!({}));
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: SerializeOptions = serde_json::from_value(json!({"ignore": ["x"]})).unwrap();
        assert!(options.validate);
        assert_eq!(options.ignore, vec!["x"]);
        assert!(serde_json::from_value::<SerializeOptions>(json!({"bogus": 1})).is_err());
    }

    #[test]
    fn test_to_json_indent() {
        let obj = SchemaObject::new(&OPEN).with("a", 1);
        assert_eq!(obj.to_json(None).unwrap(), r#"{"a":1}"#);
        assert_eq!(obj.to_json(Some(2)).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_equality() {
        let a = SchemaObject::new(&OPEN).with("a", 1);
        let b = SchemaObject::new(&OPEN).with("a", 1);
        let c = SchemaObject::new(&EMPTY).with("a", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, SchemaObject::new(&OPEN).with("a", 2));
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn test_copy_is_independent() {
        let original = SchemaObject::new(&OPEN).with("a", 1);
        let mut copy = original.clone();
        copy.set("a", 2);
        assert_eq!(original.get("a"), &Prop::from(1));
    }

    #[test]
    fn test_unset_returns_old_value() {
        let mut obj = SchemaObject::new(&OPEN).with("a", 1);
        assert_eq!(obj.unset("a"), Prop::from(1));
        assert!(obj.unset("a").is_undefined());
    }

    #[test]
    fn test_repr() {
        assert_eq!(SchemaObject::new(&EMPTY).to_string(), "Empty({})");
        assert_eq!(SchemaObject::from_value(&OP, "sum").to_string(), r#"Op("sum")"#);
        let nested = SchemaObject::new(&FIELD_DEF)
            .with("field", "x")
            .with("op", SchemaObject::from_value(&OP, "sum"));
        assert_eq!(
            nested.to_string(),
            "FieldDef({\n  field: \"x\",\n  op: Op(\"sum\")\n})"
        );
    }

    #[test]
    fn test_dir_lists_declared_and_set() {
        let obj = SchemaObject::new(&OPEN).with("zeta", 1);
        assert_eq!(obj.dir().unwrap(), vec!["a", "zeta"]);
        assert_eq!(obj.property_names(), vec!["zeta"]);
    }

    #[test]
    fn test_validate_property() {
        let obj = SchemaObject::new(&FIELD_DEF);
        obj.validate_property("field", "x").unwrap();
        let err = obj.validate_property("field", 5).unwrap_err();
        let primary = err.as_validation().unwrap().primary().unwrap().clone();
        assert_eq!(primary.instance_path.to_dotted(), "field");
        assert!(matches!(primary.kind, ViolationKind::Type { .. }));
        let err = obj.validate_property("colour", "red").unwrap_err();
        assert!(matches!(
            err.as_validation().unwrap().primary().unwrap().kind,
            ViolationKind::AdditionalProperty { .. }
        ));
        SchemaObject::new(&OPEN).validate_property("colour", "red").unwrap();
        obj.validate_property("field", UNDEFINED).unwrap();
    }

    #[test]
    fn test_from_dict_shallow() {
        let obj = SchemaObject::from_dict(&FIELD_DEF, &json!({"field": "x", "op": "sum"}), true)
            .unwrap();
        assert_eq!(obj.get("op"), &Prop::from("sum"));
        let err = SchemaObject::from_dict(&FIELD_DEF, &json!(3), false).unwrap_err();
        assert!(matches!(
            err,
            SchemapiError::Construction(ConstructionError::Shape { .. })
        ));
        let op = SchemaObject::from_json(&OP, r#""sum""#, true).unwrap();
        assert_eq!(op.value(), &Prop::from("sum"));
        assert!(matches!(
            SchemaObject::from_json(&OP, "{", true).unwrap_err(),
            SchemapiError::Serialization(_)
        ));
    }
}
