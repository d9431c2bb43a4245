//! # Schema Graph
//!
//! A root schema document compiled into a flat arena of [`Node`]s. Every
//! subschema a node points at (properties, items, `anyOf` alternatives,
//! `$ref` targets) is a [`NodeId`] into the same arena, so a recursive
//! definition such as `Spec -> LayerSpec -> Spec` is a cycle of integers
//! rather than owned recursion.
//!
//! ## `$ref` resolution
//!
//! Nodes compiled from the document are memoized by their JSON Pointer. A
//! `$ref` is compiled once into the id of its target; resolving the same
//! reference again returns the same id. The slot for a node is reserved
//! before its children are compiled, which is what lets cycles terminate.
//!
//! ## Inline fragments
//!
//! Class-level fragments that are not part of the document (usually
//! `{"$ref": "#/definitions/Name"}`) are compiled into the arena on first
//! use and memoized by their canonical text. The arena sits behind a
//! `parking_lot::RwLock`: lookups take the read lock, and only a
//! first-time compilation takes the write lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use schemapi_core::SchemaLoadError;
use serde_json::{Map, Value};

/// Handle to a compiled schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// JSON Schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl JsonType {
    /// Parse a `type` keyword entry.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => Self::Null,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array,
            "number" => Self::Number,
            "integer" => Self::Integer,
            "string" => Self::String,
            _ => return None,
        })
    }

    /// The most specific type of a value; integral numbers are `Integer`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::String(_) => Self::String,
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0) {
                    Self::Integer
                } else {
                    Self::Number
                }
            }
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn matches(self, value: &Value) -> bool {
        let actual = Self::of(value);
        actual == self || (self == Self::Number && actual == Self::Integer)
    }

    /// Keyword spelling of the type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `additionalProperties` / `additionalItems`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Additional {
    Allowed,
    Forbidden,
    Schema(NodeId),
}

/// `items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Items {
    Any,
    Single(NodeId),
    Tuple(Vec<NodeId>),
}

/// One compiled schema node.
#[derive(Debug, Clone)]
pub struct Node {
    /// `#`-prefixed JSON Pointer (or synthetic fragment location).
    pub pointer: String,
    /// The fragment as written.
    pub raw: Value,
    /// `true` / `false` boolean schemas.
    pub boolean: Option<bool>,
    pub reference: Option<NodeId>,
    /// Set when the node is nothing but a `$ref` (plus annotations).
    pub pure_ref: bool,
    /// Empty means any type.
    pub types: Vec<JsonType>,
    pub enumeration: Option<Vec<Value>>,
    pub constant: Option<Value>,
    pub any_of: Vec<NodeId>,
    pub one_of: Vec<NodeId>,
    pub all_of: Vec<NodeId>,
    pub not: Option<NodeId>,
    pub properties: Vec<(String, NodeId)>,
    pub pattern_properties: Vec<(Regex, NodeId)>,
    pub additional_properties: Additional,
    pub required: Vec<String>,
    pub min_properties: Option<usize>,
    pub max_properties: Option<usize>,
    pub items: Items,
    pub additional_items: Additional,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
}

/// Keywords that never constrain a value.
const ANNOTATIONS: &[&str] = &[
    "$ref",
    "$schema",
    "definitions",
    "$defs",
    "$comment",
    "$id",
    "description",
    "title",
    "default",
    "examples",
    "format",
    "deprecated",
];

impl Node {
    fn empty(pointer: String) -> Self {
        Self {
            pointer,
            raw: Value::Bool(true),
            boolean: None,
            reference: None,
            pure_ref: false,
            types: Vec::new(),
            enumeration: None,
            constant: None,
            any_of: Vec::new(),
            one_of: Vec::new(),
            all_of: Vec::new(),
            not: None,
            properties: Vec::new(),
            pattern_properties: Vec::new(),
            additional_properties: Additional::Allowed,
            required: Vec::new(),
            min_properties: None,
            max_properties: None,
            items: Items::Any,
            additional_items: Additional::Allowed,
            min_items: None,
            max_items: None,
            unique_items: false,
            minimum: None,
            maximum: None,
            exclusive_minimum: None,
            exclusive_maximum: None,
            multiple_of: None,
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    /// The subschema declared for property `name`, if any.
    pub fn property(&self, name: &str) -> Option<NodeId> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, id)| *id)
    }

    /// Whether the node accepts every value (`{}` or `true`).
    pub fn is_unconstrained(&self) -> bool {
        match self.boolean {
            Some(b) => b,
            None => self
                .raw
                .as_object()
                .is_some_and(|m| m.keys().all(|k| ANNOTATIONS.contains(&k.as_str()) && k != "$ref")),
        }
    }
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Arc<Node>>,
    /// Pointer without the leading `#` -> node.
    by_pointer: HashMap<String, NodeId>,
    /// Canonical fragment text -> node, for fragments outside the document.
    by_fragment: HashMap<String, NodeId>,
    fragments: usize,
}

/// A root schema document compiled into an arena of nodes.
#[derive(Debug)]
pub struct SchemaGraph {
    family: String,
    document: Value,
    arena: RwLock<Arena>,
}

impl SchemaGraph {
    /// Compile `document`, including every entry of `definitions`/`$defs`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaLoadError::InvalidSchema` for dangling or non-local
    /// `$ref`s, malformed regular expressions, and keyword values of the
    /// wrong shape.
    pub fn compile(family: impl Into<String>, document: Value) -> Result<Self, SchemaLoadError> {
        let graph = Self {
            family: family.into(),
            document,
            arena: RwLock::new(Arena::default()),
        };
        {
            let mut arena = graph.arena.write();
            let mut compiler = Compiler {
                family: &graph.family,
                document: &graph.document,
                arena: &mut *arena,
            };
            compiler.compile_pointer("")?;
            for section in ["definitions", "$defs"] {
                if let Some(defs) = graph.document.get(section).and_then(Value::as_object) {
                    for name in defs.keys() {
                        compiler.compile_pointer(&format!("/{section}/{}", escape_pointer(name)))?;
                    }
                }
            }
        }
        tracing::debug!(
            family = %graph.family,
            nodes = graph.len(),
            "compiled schema graph"
        );
        Ok(graph)
    }

    /// Schema family name.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// The root document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Number of compiled nodes.
    pub fn len(&self) -> usize {
        self.arena.read().nodes.len()
    }

    /// Whether the arena is empty (never true after `compile`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node for the document root.
    pub fn root(&self) -> NodeId {
        // Compiled first, so it always occupies slot zero.
        NodeId(0)
    }

    /// Look up a compiled node.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.arena.read().nodes.get(id.index()).cloned()
    }

    /// The fragment text of a node as written in the document.
    pub fn fragment(&self, id: NodeId) -> Option<Value> {
        self.node(id).map(|n| n.raw.clone())
    }

    /// The node for a named definition under `definitions` or `$defs`.
    pub fn definition(&self, name: &str) -> Option<NodeId> {
        let arena = self.arena.read();
        let escaped = escape_pointer(name);
        arena
            .by_pointer
            .get(&format!("/definitions/{escaped}"))
            .or_else(|| arena.by_pointer.get(&format!("/$defs/{escaped}")))
            .copied()
    }

    /// `$ref` pointer of a named definition, under whichever of
    /// `definitions` or `$defs` holds it.
    pub fn definition_pointer(&self, name: &str) -> Option<String> {
        self.definition(name)
            .and_then(|id| self.node(id))
            .map(|node| node.pointer.clone())
    }

    /// Names of every definition in the document, sorted.
    pub fn definition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["definitions", "$defs"]
            .iter()
            .filter_map(|s| self.document.get(*s).and_then(Value::as_object))
            .flat_map(|m| m.keys().cloned())
            .collect();
        names.sort();
        names
    }

    /// The definition name a node was compiled from, if it is one.
    pub fn definition_name(&self, id: NodeId) -> Option<String> {
        let node = self.node(id)?;
        let rest = node
            .pointer
            .strip_prefix("#/definitions/")
            .or_else(|| node.pointer.strip_prefix("#/$defs/"))?;
        if rest.contains('/') {
            return None;
        }
        Some(unescape_pointer(rest))
    }

    /// Resolve a local `$ref` such as `#/definitions/Spec` to its node.
    ///
    /// Memoized: the same reference always yields the same id.
    ///
    /// # Errors
    ///
    /// Returns `SchemaLoadError::InvalidSchema` if the reference is not
    /// local or does not point into the document.
    pub fn resolve_ref(&self, reference: &str) -> Result<NodeId, SchemaLoadError> {
        let pointer = local_pointer(&self.family, "#", reference)?;
        if let Some(id) = self.arena.read().by_pointer.get(&pointer) {
            return Ok(*id);
        }
        self.with_compiler(|c| c.compile_pointer(&pointer))
    }

    /// Follow a chain of pure `$ref` nodes to the first node that carries
    /// constraints of its own. Cycles of pure references stop at the node
    /// where the cycle closes.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        let mut current = id;
        let mut seen = HashSet::new();
        while seen.insert(current) {
            match self.node(current) {
                Some(node) if node.pure_ref => match node.reference {
                    Some(next) => current = next,
                    None => break,
                },
                _ => break,
            }
        }
        current
    }

    /// Compile a fragment that lives outside the document, memoized by its
    /// canonical text. `$ref`s inside it resolve against the document.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaGraph::compile`]; a failed compilation leaves the
    /// arena unchanged.
    pub fn compile_fragment(&self, fragment: &Value) -> Result<NodeId, SchemaLoadError> {
        let key = fragment.to_string();
        if let Some(id) = self.arena.read().by_fragment.get(&key) {
            return Ok(*id);
        }
        self.with_compiler(|c| {
            // Another caller may have compiled it between the two locks.
            if let Some(id) = c.arena.by_fragment.get(&key) {
                return Ok(*id);
            }
            let base = format!("(fragment {})", c.arena.fragments);
            let id = c.compile_value(fragment, &base)?;
            c.arena.fragments += 1;
            c.arena.by_fragment.insert(key, id);
            Ok(id)
        })
    }

    /// Declared property names of a node after resolving pure references.
    pub fn property_names(&self, id: NodeId) -> Vec<String> {
        self.node(self.resolve(id))
            .map(|n| n.properties.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// Run a compilation under the write lock, rolling the arena back if it
    /// fails so no half-compiled placeholder stays reachable.
    fn with_compiler<F>(&self, f: F) -> Result<NodeId, SchemaLoadError>
    where
        F: FnOnce(&mut Compiler<'_>) -> Result<NodeId, SchemaLoadError>,
    {
        let mut arena = self.arena.write();
        let mark = arena.nodes.len();
        let result = {
            let mut compiler = Compiler {
                family: &self.family,
                document: &self.document,
                arena: &mut *arena,
            };
            f(&mut compiler)
        };
        if result.is_err() {
            arena.nodes.truncate(mark);
            arena.by_pointer.retain(|_, id| id.index() < mark);
        }
        result
    }
}

struct Compiler<'a> {
    family: &'a str,
    document: &'a Value,
    arena: &'a mut Arena,
}

impl Compiler<'_> {
    fn invalid(&self, pointer: &str, reason: impl Into<String>) -> SchemaLoadError {
        SchemaLoadError::InvalidSchema {
            family: self.family.to_string(),
            pointer: format!("#{pointer}"),
            reason: reason.into(),
        }
    }

    /// Compile the document node at `pointer` (no leading `#`).
    fn compile_pointer(&mut self, pointer: &str) -> Result<NodeId, SchemaLoadError> {
        if let Some(id) = self.arena.by_pointer.get(pointer) {
            return Ok(*id);
        }
        let document = self.document;
        let value = document
            .pointer(pointer)
            .ok_or_else(|| self.invalid(pointer, "pointer does not resolve inside the document"))?;
        self.compile_value(value, pointer)
    }

    fn compile_value(&mut self, value: &Value, pointer: &str) -> Result<NodeId, SchemaLoadError> {
        if let Some(id) = self.arena.by_pointer.get(pointer) {
            return Ok(*id);
        }
        let index = u32::try_from(self.arena.nodes.len())
            .map_err(|_| self.invalid(pointer, "schema graph exceeds u32 nodes"))?;
        let id = NodeId(index);
        self.arena
            .nodes
            .push(Arc::new(Node::empty(format!("#{pointer}"))));
        self.arena.by_pointer.insert(pointer.to_string(), id);

        let node = self.build(value, pointer)?;
        self.arena.nodes[id.index()] = Arc::new(node);
        Ok(id)
    }

    fn build(&mut self, value: &Value, pointer: &str) -> Result<Node, SchemaLoadError> {
        let mut node = Node::empty(format!("#{pointer}"));
        node.raw = value.clone();
        let map = match value {
            Value::Bool(b) => {
                node.boolean = Some(*b);
                return Ok(node);
            }
            Value::Object(map) => map,
            other => {
                return Err(self.invalid(
                    pointer,
                    format!("schema must be an object or boolean, found {}", JsonType::of(other)),
                ))
            }
        };

        if let Some(reference) = map.get("$ref") {
            let reference = reference
                .as_str()
                .ok_or_else(|| self.invalid(pointer, "$ref must be a string"))?;
            let target = local_pointer(self.family, pointer, reference)?;
            node.reference = Some(self.compile_pointer(&target)?);
            node.pure_ref = map.keys().all(|k| ANNOTATIONS.contains(&k.as_str()));
        }

        if let Some(types) = map.get("type") {
            node.types = self.parse_types(types, pointer)?;
        }
        if let Some(values) = map.get("enum") {
            let values = values
                .as_array()
                .ok_or_else(|| self.invalid(pointer, "enum must be an array"))?;
            node.enumeration = Some(values.clone());
        }
        node.constant = map.get("const").cloned();

        node.any_of = self.compile_list(map, "anyOf", pointer)?;
        node.one_of = self.compile_list(map, "oneOf", pointer)?;
        node.all_of = self.compile_list(map, "allOf", pointer)?;
        if let Some(not) = map.get("not") {
            node.not = Some(self.compile_value(not, &format!("{pointer}/not"))?);
        }

        if let Some(props) = map.get("properties") {
            let props = props
                .as_object()
                .ok_or_else(|| self.invalid(pointer, "properties must be an object"))?;
            for (name, sub) in props {
                let child = format!("{pointer}/properties/{}", escape_pointer(name));
                let id = self.compile_value(sub, &child)?;
                node.properties.push((name.clone(), id));
            }
        }
        if let Some(patterns) = map.get("patternProperties") {
            let patterns = patterns
                .as_object()
                .ok_or_else(|| self.invalid(pointer, "patternProperties must be an object"))?;
            for (pattern, sub) in patterns {
                let regex = Regex::new(pattern)
                    .map_err(|e| self.invalid(pointer, format!("invalid patternProperties regex: {e}")))?;
                let child = format!("{pointer}/patternProperties/{}", escape_pointer(pattern));
                let id = self.compile_value(sub, &child)?;
                node.pattern_properties.push((regex, id));
            }
        }
        node.additional_properties =
            self.compile_additional(map.get("additionalProperties"), &format!("{pointer}/additionalProperties"))?;
        if let Some(required) = map.get("required") {
            node.required = required
                .as_array()
                .ok_or_else(|| self.invalid(pointer, "required must be an array"))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(pointer, "required entries must be strings"))
                })
                .collect::<Result<_, _>>()?;
        }
        node.min_properties = self.parse_count(map, "minProperties", pointer)?;
        node.max_properties = self.parse_count(map, "maxProperties", pointer)?;

        match map.get("items") {
            None => {}
            Some(Value::Array(list)) => {
                let mut ids = Vec::with_capacity(list.len());
                for (i, sub) in list.iter().enumerate() {
                    ids.push(self.compile_value(sub, &format!("{pointer}/items/{i}"))?);
                }
                node.items = Items::Tuple(ids);
            }
            Some(sub) => {
                node.items = Items::Single(self.compile_value(sub, &format!("{pointer}/items"))?);
            }
        }
        node.additional_items =
            self.compile_additional(map.get("additionalItems"), &format!("{pointer}/additionalItems"))?;
        node.min_items = self.parse_count(map, "minItems", pointer)?;
        node.max_items = self.parse_count(map, "maxItems", pointer)?;
        node.unique_items = map.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false);

        node.minimum = self.parse_number(map, "minimum", pointer)?;
        node.maximum = self.parse_number(map, "maximum", pointer)?;
        // Draft 4 spells exclusivity as a boolean modifier of minimum/maximum.
        match map.get("exclusiveMinimum") {
            Some(Value::Bool(true)) => node.exclusive_minimum = node.minimum.take(),
            Some(Value::Bool(false)) | None => {}
            Some(_) => node.exclusive_minimum = self.parse_number(map, "exclusiveMinimum", pointer)?,
        }
        match map.get("exclusiveMaximum") {
            Some(Value::Bool(true)) => node.exclusive_maximum = node.maximum.take(),
            Some(Value::Bool(false)) | None => {}
            Some(_) => node.exclusive_maximum = self.parse_number(map, "exclusiveMaximum", pointer)?,
        }
        node.multiple_of = self.parse_number(map, "multipleOf", pointer)?;
        if node.multiple_of.is_some_and(|m| m <= 0.0) {
            return Err(self.invalid(pointer, "multipleOf must be positive"));
        }
        node.min_length = self.parse_count(map, "minLength", pointer)?;
        node.max_length = self.parse_count(map, "maxLength", pointer)?;
        if let Some(pattern) = map.get("pattern") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| self.invalid(pointer, "pattern must be a string"))?;
            node.pattern = Some(
                Regex::new(pattern)
                    .map_err(|e| self.invalid(pointer, format!("invalid pattern regex: {e}")))?,
            );
        }
        Ok(node)
    }

    fn parse_types(&self, types: &Value, pointer: &str) -> Result<Vec<JsonType>, SchemaLoadError> {
        let names: Vec<&Value> = match types {
            Value::Array(list) => list.iter().collect(),
            single => vec![single],
        };
        names
            .into_iter()
            .map(|name| {
                name.as_str()
                    .and_then(JsonType::parse)
                    .ok_or_else(|| self.invalid(pointer, format!("unknown type {name}")))
            })
            .collect()
    }

    fn compile_list(
        &mut self,
        map: &Map<String, Value>,
        keyword: &str,
        pointer: &str,
    ) -> Result<Vec<NodeId>, SchemaLoadError> {
        let Some(list) = map.get(keyword) else {
            return Ok(Vec::new());
        };
        let list = list
            .as_array()
            .ok_or_else(|| self.invalid(pointer, format!("{keyword} must be an array")))?;
        let mut ids = Vec::with_capacity(list.len());
        for (i, sub) in list.iter().enumerate() {
            ids.push(self.compile_value(sub, &format!("{pointer}/{keyword}/{i}"))?);
        }
        Ok(ids)
    }

    fn compile_additional(
        &mut self,
        value: Option<&Value>,
        pointer: &str,
    ) -> Result<Additional, SchemaLoadError> {
        Ok(match value {
            None | Some(Value::Bool(true)) => Additional::Allowed,
            Some(Value::Bool(false)) => Additional::Forbidden,
            Some(sub) => Additional::Schema(self.compile_value(sub, pointer)?),
        })
    }

    fn parse_count(
        &self,
        map: &Map<String, Value>,
        keyword: &str,
        pointer: &str,
    ) -> Result<Option<usize>, SchemaLoadError> {
        match map.get(keyword) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(pointer, format!("{keyword} must be a non-negative integer"))),
        }
    }

    fn parse_number(
        &self,
        map: &Map<String, Value>,
        keyword: &str,
        pointer: &str,
    ) -> Result<Option<f64>, SchemaLoadError> {
        match map.get(keyword) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(pointer, format!("{keyword} must be a number"))),
        }
    }
}

/// Turn a `$ref` into a document pointer without the leading `#`.
fn local_pointer(family: &str, from: &str, reference: &str) -> Result<String, SchemaLoadError> {
    match reference.strip_prefix('#') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => Ok(rest.to_string()),
        _ => Err(SchemaLoadError::InvalidSchema {
            family: family.to_string(),
            pointer: if from.starts_with('#') { from.to_string() } else { format!("#{from}") },
            reason: format!("only local JSON Pointer references are supported, found '{reference}'"),
        }),
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
