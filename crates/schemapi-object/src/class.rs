//! # Schema Classes
//!
//! A [`SchemaClass`] is the static description of one wrapper type: its
//! name, the family whose root document it was cut from, and the schema
//! fragment it validates against. Descriptors are `const`-constructible so
//! generated code can declare them as `static` items; the compiled node is
//! looked up once per process and cached on the descriptor.
//!
//! [`SchemaWrapper`] is the trait every typed wrapper implements. It only
//! asks for the descriptor and a conversion into the dynamic
//! [`SchemaObject`]; serialization and validation come for free.

use std::fmt;
use std::sync::{Arc, OnceLock};

use schemapi_core::SchemaLoadError;
use schemapi_schema::{NodeId, RootSchema, SchemaFamily, ValidatorOptions};
use serde_json::{json, Value};

use crate::error::SchemapiError;
use crate::object::SchemaObject;

/// Where a class's schema comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    /// The document root itself.
    Root,
    /// A named entry under `definitions`; the class schema is a `$ref` to it.
    Definition(&'static str),
    /// Literal schema JSON whose `$ref`s resolve against the root document.
    Inline(&'static str),
}

/// How instances are constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Keyword properties serialized as a JSON object.
    Object,
    /// A single positional value serialized as-is.
    Value,
}

/// Static descriptor of a schema-backed class.
pub struct SchemaClass {
    name: &'static str,
    family: &'static SchemaFamily,
    fragment: Fragment,
    kind: ClassKind,
    node: OnceLock<Result<NodeId, SchemaLoadError>>,
}

impl SchemaClass {
    /// Declare a class. Usable in a `static`.
    pub const fn new(
        name: &'static str,
        family: &'static SchemaFamily,
        fragment: Fragment,
        kind: ClassKind,
    ) -> Self {
        Self {
            name,
            family,
            fragment,
            kind,
            node: OnceLock::new(),
        }
    }

    /// Class name as shown in `repr` output and error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The family this class belongs to.
    pub fn family(&self) -> &'static SchemaFamily {
        self.family
    }

    /// Construction kind.
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Where the schema comes from.
    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    /// The definition name this class wraps, if it wraps one.
    pub fn definition_name(&self) -> Option<&'static str> {
        match self.fragment {
            Fragment::Definition(name) => Some(name),
            _ => None,
        }
    }

    /// The class's own schema fragment, unresolved.
    ///
    /// # Errors
    ///
    /// Returns `SchemaLoadError::Parse` for malformed inline JSON,
    /// `SchemaLoadError::InvalidSchema` for a definition the document does
    /// not have, or the family's load error.
    pub fn get_schema(&self) -> Result<Value, SchemaLoadError> {
        match self.fragment {
            Fragment::Root => Ok(self.get_root_schema()?.document().clone()),
            Fragment::Definition(name) => {
                let root = self.get_root_schema()?;
                let pointer = root
                    .graph()
                    .definition_pointer(name)
                    .ok_or_else(|| self.missing_definition(name))?;
                Ok(json!({ "$ref": pointer }))
            }
            Fragment::Inline(text) => {
                serde_json::from_str(text).map_err(|e| SchemaLoadError::Parse {
                    family: self.family.name().to_string(),
                    reason: format!("inline schema of {}: {e}", self.name),
                })
            }
        }
    }

    /// The root schema of the class's family, loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns the family's `SchemaLoadError`.
    pub fn get_root_schema(&self) -> Result<Arc<RootSchema>, SchemaLoadError> {
        self.family.root()
    }

    /// The compiled node of the class schema in the family graph.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaLoadError` if the family fails to load or the
    /// fragment does not compile. The outcome is cached.
    pub fn node(&self) -> Result<NodeId, SchemaLoadError> {
        self.node
            .get_or_init(|| {
                let root = self.get_root_schema()?;
                let graph = root.graph();
                match self.fragment {
                    Fragment::Root => Ok(graph.root()),
                    Fragment::Definition(name) => graph
                        .definition(name)
                        .ok_or_else(|| self.missing_definition(name)),
                    Fragment::Inline(_) => graph.compile_fragment(&self.get_schema()?),
                }
            })
            .clone()
    }

    /// The schema fragment after following pure `$ref` chains.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaClass::node`].
    pub fn resolved_schema(&self) -> Result<Value, SchemaLoadError> {
        let root = self.get_root_schema()?;
        let graph = root.graph();
        let id = graph.resolve(self.node()?);
        graph.fragment(id).ok_or_else(|| SchemaLoadError::InvalidSchema {
            family: self.family.name().to_string(),
            pointer: format!("{id:?}"),
            reason: "node missing from graph".into(),
        })
    }

    /// Property names the schema declares, in document order.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaClass::node`].
    pub fn property_names(&self) -> Result<Vec<String>, SchemaLoadError> {
        let root = self.get_root_schema()?;
        Ok(root.graph().property_names(self.node()?))
    }

    /// Validate a raw JSON value against the class schema.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Load` or `SchemapiError::Validation`.
    pub fn validate_value(&self, value: &Value) -> Result<(), SchemapiError> {
        self.validate_value_with(value, ValidatorOptions::default())
    }

    /// Validate a raw JSON value with explicit validator options.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Load` or `SchemapiError::Validation`.
    pub fn validate_value_with(
        &self,
        value: &Value,
        options: ValidatorOptions,
    ) -> Result<(), SchemapiError> {
        let root = self.get_root_schema()?;
        let id = self.node()?;
        root.validator_with(options)
            .validate(id, value)
            .map_err(|mut e| {
                e.schema = self.name.to_string();
                SchemapiError::from(e)
            })
    }

    fn missing_definition(&self, name: &str) -> SchemaLoadError {
        SchemaLoadError::InvalidSchema {
            family: self.family.name().to_string(),
            pointer: format!("#/definitions/{name}"),
            reason: format!("no definition named '{name}' under definitions or $defs"),
        }
    }

    /// Whether `value` conforms. Load failures count as non-conforming.
    pub fn is_valid(&self, value: &Value) -> bool {
        match (self.get_root_schema(), self.node()) {
            (Ok(root), Ok(id)) => root.validator().is_valid(id, value),
            _ => false,
        }
    }
}

impl fmt::Debug for SchemaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaClass")
            .field("name", &self.name)
            .field("family", &self.family.name())
            .field("fragment", &self.fragment)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for SchemaClass {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.family.name() == other.family.name()
    }
}

impl Eq for SchemaClass {}

/// A typed wrapper around a [`SchemaObject`].
///
/// Implementations are normally produced by [`schema_class!`](crate::schema_class).
pub trait SchemaWrapper: Clone {
    /// The class descriptor.
    fn class() -> &'static SchemaClass;

    /// Convert into the dynamic object, dropping unset properties.
    fn into_object(self) -> SchemaObject;

    /// Serialize to a JSON value, validating first.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::to_dict`].
    fn to_dict(&self) -> Result<Value, SchemapiError> {
        self.clone().into_object().to_dict()
    }

    /// Serialize to JSON text, validating first.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::to_json`].
    fn to_json(&self, indent: Option<usize>) -> Result<String, SchemapiError> {
        self.clone().into_object().to_json(indent)
    }

    /// Validate without serializing.
    ///
    /// # Errors
    ///
    /// See [`SchemaObject::validate`].
    fn validate(&self) -> Result<(), SchemapiError> {
        self.clone().into_object().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SHAPES: SchemaFamily = SchemaFamily::embedded(
        "shapes",
        r##"{
            "$ref": "#/definitions/Shape",
            "definitions": {
                "Shape": {
                    "type": "object",
                    "properties": {"kind": {"$ref": "#/definitions/Kind"}, "size": {"type": "number"}},
                    "required": ["kind"]
                },
                "Kind": {"enum": ["circle", "square"]},
                "Alias": {"$ref": "#/definitions/Kind"}
            }
        }"##,
    );

    static SHAPE: SchemaClass =
        SchemaClass::new("Shape", &SHAPES, Fragment::Definition("Shape"), ClassKind::Object);
    static ALIAS: SchemaClass =
        SchemaClass::new("Alias", &SHAPES, Fragment::Definition("Alias"), ClassKind::Value);
    static SIZED: SchemaClass = SchemaClass::new(
        "Sized",
        &SHAPES,
        Fragment::Inline(r#"{"type": "object", "properties": {"size": {"type": "number"}}}"#),
        ClassKind::Object,
    );
    static BAD_INLINE: SchemaClass =
        SchemaClass::new("Bad", &SHAPES, Fragment::Inline("{"), ClassKind::Object);
    static MISSING: SchemaClass =
        SchemaClass::new("Missing", &SHAPES, Fragment::Definition("Missing"), ClassKind::Value);

    static LABELS: SchemaFamily = SchemaFamily::embedded(
        "labels",
        r##"{
            "$defs": {
                "Align": {"enum": ["left", "right"]},
                "Label": {
                    "type": "object",
                    "properties": {"align": {"$ref": "#/$defs/Align"}},
                    "additionalProperties": false
                }
            }
        }"##,
    );

    static ALIGN: SchemaClass =
        SchemaClass::new("Align", &LABELS, Fragment::Definition("Align"), ClassKind::Value);
    static LABEL: SchemaClass =
        SchemaClass::new("Label", &LABELS, Fragment::Definition("Label"), ClassKind::Object);

    #[test]
    fn test_get_schema_is_a_ref() {
        assert_eq!(
            SHAPE.get_schema().unwrap(),
            json!({"$ref": "#/definitions/Shape"})
        );
        assert_eq!(SHAPE.definition_name(), Some("Shape"));
        assert_eq!(SIZED.definition_name(), None);
    }

    #[test]
    fn test_root_schema_shared() {
        let a = SHAPE.get_root_schema().unwrap();
        let b = ALIAS.get_root_schema().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_resolved_schema_follows_alias() {
        assert_eq!(
            ALIAS.resolved_schema().unwrap(),
            json!({"enum": ["circle", "square"]})
        );
    }

    #[test]
    fn test_node_cached() {
        let first = SIZED.node().unwrap();
        let second = SIZED.node().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_property_names() {
        assert_eq!(SHAPE.property_names().unwrap(), vec!["kind", "size"]);
        assert!(ALIAS.property_names().unwrap().is_empty());
    }

    #[test]
    fn test_validate_value_names_class() {
        SHAPE.validate_value(&json!({"kind": "circle"})).unwrap();
        let err = SHAPE.validate_value(&json!({"kind": "hexagon"})).unwrap_err();
        let validation = err.as_validation().unwrap();
        assert_eq!(validation.schema, "Shape");
        assert_eq!(validation.primary().unwrap().instance_path.to_dotted(), "kind");
        assert!(SHAPE.is_valid(&json!({"kind": "square", "size": 2})));
        assert!(!SHAPE.is_valid(&json!({"size": 2})));
    }

    #[test]
    fn test_bad_inline_fragment() {
        assert!(matches!(
            BAD_INLINE.node().unwrap_err(),
            SchemaLoadError::Parse { .. }
        ));
        assert!(!BAD_INLINE.is_valid(&json!({})));
    }

    #[test]
    fn test_dollar_defs_definitions() {
        assert_eq!(ALIGN.get_schema().unwrap(), json!({"$ref": "#/$defs/Align"}));
        assert_eq!(ALIGN.node().unwrap(), LABELS.root().unwrap().definition("Align").unwrap());
        ALIGN.validate_value(&json!("left")).unwrap();
        assert!(!ALIGN.is_valid(&json!("middle")));

        LABEL.validate_value(&json!({"align": "right"})).unwrap();
        let err = LABEL.validate_value(&json!({"align": "middle"})).unwrap_err();
        let primary = err.as_validation().unwrap().primary().unwrap().clone();
        assert_eq!(primary.instance_path.to_dotted(), "align");
        assert_eq!(primary.schema_path, "#/$defs/Align/enum");
    }

    #[test]
    fn test_missing_definition() {
        match MISSING.node().unwrap_err() {
            SchemaLoadError::InvalidSchema { reason, .. } => assert!(reason.contains("Missing")),
            other => panic!("Expected InvalidSchema, got {other:?}"),
        }
        assert!(MISSING.get_schema().is_err());
        assert!(!MISSING.is_valid(&json!("anything")));
    }

    #[test]
    fn test_class_equality_by_name_and_family() {
        assert_eq!(SHAPE, SHAPE);
        assert_ne!(SHAPE, ALIAS);
        assert!(format!("{SHAPE:?}").contains("shapes"));
    }
}
