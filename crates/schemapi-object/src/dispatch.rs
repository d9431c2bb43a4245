//! # Class Dispatch
//!
//! A [`ClassRegistry`] holds the wrapper classes of one family and answers
//! "which class does this raw JSON value belong to?". Candidates are tried
//! from most to least specific and the first whose schema accepts the
//! value wins:
//!
//! 1. literal schemas (`const` or `enum`),
//! 2. closed objects (`additionalProperties: false`),
//! 3. other object schemas,
//! 4. other typed schemas,
//! 5. bare unions (`anyOf` with no type of their own),
//! 6. unconstrained schemas.
//!
//! Within a tier, objects with more required properties come first, and
//! remaining ties keep registration order. The resulting order is
//! deterministic for a given registry.
//!
//! [`ClassRegistry::wrap`] and [`ClassRegistry::from_dict`] go further and
//! rebuild a whole tree of typed objects, wrapping nested values wherever
//! the schema points at a registered definition.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use schemapi_core::SchemaLoadError;
use schemapi_schema::{
    Additional, Items, JsonType, Node, NodeId, RootSchema, SchemaFamily, ValidationError,
    DEFAULT_MAX_DEPTH,
};
use serde_json::Value;

use crate::class::{ClassKind, SchemaClass};
use crate::error::{DispatchError, SchemapiError};
use crate::object::SchemaObject;
use crate::prop::Prop;

/// Specificity tier; lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    /// `const` or `enum`.
    Literal,
    /// Object schema with `additionalProperties: false`.
    ClosedObject,
    /// Any other object schema.
    OpenObject,
    /// Any other schema with a `type`.
    Typed,
    /// An untyped union.
    Union,
    /// Accepts anything.
    Unconstrained,
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    tier: Specificity,
    required: usize,
    order: usize,
}

/// The wrapper classes of one schema family.
#[derive(Debug)]
pub struct ClassRegistry {
    family: &'static SchemaFamily,
    classes: Vec<&'static SchemaClass>,
    order: OnceLock<Result<Vec<usize>, SchemaLoadError>>,
    max_depth: usize,
}

impl ClassRegistry {
    /// An empty registry for `family`.
    pub fn new(family: &'static SchemaFamily) -> Self {
        Self {
            family,
            classes: Vec::new(),
            order: OnceLock::new(),
            // Union members are validated from inside the tree walk, so the
            // walk and the validator share one stack.
            max_depth: DEFAULT_MAX_DEPTH / 2,
        }
    }

    /// Set the bound on schema nodes visited along one path while
    /// rebuilding a typed tree.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Nesting bound for [`ClassRegistry::wrap`] and
    /// [`ClassRegistry::from_dict`].
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// A registry holding `classes`, all of which must belong to `family`.
    ///
    /// # Errors
    ///
    /// `DispatchError::ForeignClass` for a class from another family.
    pub fn with_classes(
        family: &'static SchemaFamily,
        classes: impl IntoIterator<Item = &'static SchemaClass>,
    ) -> Result<Self, DispatchError> {
        let mut registry = Self::new(family);
        for class in classes {
            registry.register(class)?;
        }
        Ok(registry)
    }

    /// Add a class. Registering the same class twice is a no-op.
    ///
    /// # Errors
    ///
    /// `DispatchError::ForeignClass` for a class from another family.
    pub fn register(&mut self, class: &'static SchemaClass) -> Result<(), DispatchError> {
        if class.family().name() != self.family.name() {
            return Err(DispatchError::ForeignClass {
                class: class.name().to_string(),
                expected: self.family.name().to_string(),
                actual: class.family().name().to_string(),
            });
        }
        if !self.classes.iter().any(|c| *c == class) {
            self.classes.push(class);
            self.order = OnceLock::new();
        }
        Ok(())
    }

    /// Family name.
    pub fn family(&self) -> &str {
        self.family.name()
    }

    /// Registered classes in registration order.
    pub fn classes(&self) -> &[&'static SchemaClass] {
        &self.classes
    }

    /// Registered classes in dispatch order.
    ///
    /// # Errors
    ///
    /// The family's load error.
    pub fn dispatch_order(&self) -> Result<Vec<&'static SchemaClass>, SchemaLoadError> {
        Ok(self.ranked()?.iter().map(|&i| self.classes[i]).collect())
    }

    /// Look up a class by name.
    pub fn by_name(&self, name: &str) -> Option<&'static SchemaClass> {
        self.classes.iter().copied().find(|c| c.name() == name)
    }

    /// Look up the class wrapping a named definition.
    pub fn by_definition(&self, definition: &str) -> Option<&'static SchemaClass> {
        self.classes
            .iter()
            .copied()
            .find(|c| c.definition_name() == Some(definition))
    }

    /// The most specific registered class whose schema accepts `value`.
    ///
    /// # Errors
    ///
    /// `DispatchError::NoMatch` naming the nearest candidate, or the
    /// family's load error.
    pub fn dispatch(&self, value: &Value) -> Result<&'static SchemaClass, DispatchError> {
        let order = self.ranked()?;
        let root = self.family.root()?;
        let validator = root.validator();

        for &i in order.iter() {
            let class = self.classes[i];
            if validator.is_valid(class.node()?, value) {
                tracing::debug!(family = %self.family.name(), class = class.name(), "dispatched value");
                return Ok(class);
            }
        }

        // Nearest = deepest failure, then fewest leaf violations; ties keep
        // dispatch order.
        let mut nearest: Option<((Reverse<usize>, usize), &'static SchemaClass, Vec<_>)> = None;
        for &i in order.iter() {
            let class = self.classes[i];
            let violations = validator.violations(class.node()?, value);
            let leaves: Vec<_> = violations.iter().flat_map(|v| v.leaves()).collect();
            let deepest = leaves.iter().map(|v| v.instance_path.depth()).max().unwrap_or(0);
            let score = (Reverse(deepest), leaves.len());
            if nearest.as_ref().map_or(true, |(best, _, _)| score < *best) {
                nearest = Some((score, class, violations));
            }
        }
        tracing::debug!(family = %self.family.name(), tried = order.len(), "no class accepts value");
        Err(DispatchError::NoMatch {
            family: self.family.name().to_string(),
            tried: order.len(),
            nearest: nearest.map(|(_, class, violations)| {
                (
                    class.name().to_string(),
                    ValidationError::new(class.name(), violations),
                )
            }),
        })
    }

    /// Dispatch `value` and build a typed object tree from it.
    ///
    /// # Errors
    ///
    /// See [`ClassRegistry::dispatch`].
    pub fn wrap(&self, value: &Value) -> Result<SchemaObject, DispatchError> {
        let class = self.dispatch(value)?;
        self.build_tree(class, value)
    }

    /// Build an instance of `class` from a raw value, wrapping nested
    /// values in registered classes wherever the schema references them.
    ///
    /// A union class resolves to the class of the first alternative that
    /// accepts the value, and only keeps its own class when that
    /// alternative has none.
    ///
    /// # Errors
    ///
    /// `SchemapiError::Validation` when `validate` is set and the value
    /// does not conform, `DispatchError::RecursionLimit` when the value
    /// nests deeper than [`ClassRegistry::max_depth`], or the family's
    /// load error.
    pub fn from_dict(
        &self,
        class: &'static SchemaClass,
        value: &Value,
        validate: bool,
    ) -> Result<SchemaObject, SchemapiError> {
        if validate {
            class.validate_value(value)?;
        }
        Ok(self.build_tree(class, value)?)
    }

    /// Parse JSON text and build an instance with [`ClassRegistry::from_dict`].
    ///
    /// # Errors
    ///
    /// `SchemapiError::Serialization` for malformed text, otherwise as
    /// [`ClassRegistry::from_dict`].
    pub fn from_json(
        &self,
        class: &'static SchemaClass,
        text: &str,
        validate: bool,
    ) -> Result<SchemaObject, SchemapiError> {
        let value: Value = serde_json::from_str(text)?;
        self.from_dict(class, &value, validate)
    }

    fn build_tree(&self, class: &'static SchemaClass, value: &Value) -> Result<SchemaObject, DispatchError> {
        let root = self.family.root()?;
        let mut visited = Vec::new();
        match self.wrap_node(&root, class.node()?, value, Some(class), &mut visited, 0)? {
            Prop::Object(obj) => Ok(*obj),
            other => {
                let mut obj = SchemaObject::new(class);
                obj.set_value(other);
                Ok(obj)
            }
        }
    }

    /// Wrap `value` found at schema node `id`. `default` is the class to
    /// use when neither `id` nor a matching union member has one.
    fn wrap_node(
        &self,
        root: &RootSchema,
        id: NodeId,
        value: &Value,
        default: Option<&'static SchemaClass>,
        visited: &mut Vec<NodeId>,
        depth: usize,
    ) -> Result<Prop, DispatchError> {
        if depth >= self.max_depth {
            return Err(DispatchError::RecursionLimit {
                family: self.family.name().to_string(),
                max_depth: self.max_depth,
            });
        }
        let depth = depth + 1;
        let graph = root.graph();
        let class = self.class_at(root, id).or(default);
        let resolved = graph.resolve(id);
        let Some(node) = graph.node(resolved) else {
            return Ok(Prop::Json(value.clone()));
        };

        // Unions of unions may loop back on themselves for the same value.
        if !visited.contains(&resolved) {
            visited.push(resolved);
            let validator = root.validator();
            for alt in node.any_of.iter().chain(node.one_of.iter()) {
                if validator.is_valid(*alt, value) {
                    tracing::trace!(pointer = %node.pointer, "wrapping union member");
                    return self.wrap_node(root, *alt, value, class, visited, depth);
                }
            }
        }

        match class {
            Some(class) => Ok(Prop::from(self.build(root, class, &node, value, depth)?)),
            None => self.wrap_children(root, &node, value, depth),
        }
    }

    /// First registered class along the pure-ref chain starting at `id`.
    fn class_at(&self, root: &RootSchema, id: NodeId) -> Option<&'static SchemaClass> {
        let graph = root.graph();
        let mut current = id;
        for _ in 0..graph.len() {
            if let Some(class) = graph
                .definition_name(current)
                .and_then(|name| self.by_definition(&name))
            {
                return Some(class);
            }
            match graph.node(current) {
                Some(node) if node.pure_ref => current = node.reference?,
                _ => return None,
            }
        }
        None
    }

    fn build(
        &self,
        root: &RootSchema,
        class: &'static SchemaClass,
        node: &Node,
        value: &Value,
        depth: usize,
    ) -> Result<SchemaObject, DispatchError> {
        let mut obj = SchemaObject::new(class);
        match (class.kind(), value) {
            (ClassKind::Object, Value::Object(map)) => {
                for (key, item) in map {
                    obj.set(key.clone(), self.wrap_property(root, node, key, item, depth)?);
                }
            }
            _ => obj.set_value(self.wrap_children(root, node, value, depth)?),
        }
        Ok(obj)
    }

    fn wrap_property(
        &self,
        root: &RootSchema,
        node: &Node,
        key: &str,
        item: &Value,
        depth: usize,
    ) -> Result<Prop, DispatchError> {
        match property_node(node, key) {
            Some(id) => self.wrap_node(root, id, item, None, &mut Vec::new(), depth),
            None => Ok(Prop::Json(item.clone())),
        }
    }

    /// Wrap the contents of `value` under a node with no class of its own.
    fn wrap_children(
        &self,
        root: &RootSchema,
        node: &Node,
        value: &Value,
        depth: usize,
    ) -> Result<Prop, DispatchError> {
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child = match &node.items {
                        Items::Single(sub) => Some(*sub),
                        Items::Tuple(subs) => subs.get(i).copied().or(match node.additional_items {
                            Additional::Schema(extra) => Some(extra),
                            _ => None,
                        }),
                        Items::Any => None,
                    };
                    out.push(match child {
                        Some(sub) => self.wrap_node(root, sub, item, None, &mut Vec::new(), depth)?,
                        None => Prop::Json(item.clone()),
                    });
                }
                Ok(Prop::List(out))
            }
            Value::Object(map) if !node.properties.is_empty() => {
                let mut out = BTreeMap::new();
                for (key, item) in map {
                    out.insert(key.clone(), self.wrap_property(root, node, key, item, depth)?);
                }
                Ok(Prop::Dict(out))
            }
            other => Ok(Prop::Json(other.clone())),
        }
    }

    fn ranked(&self) -> Result<&Vec<usize>, SchemaLoadError> {
        self.order
            .get_or_init(|| {
                let root = self.family.root()?;
                let mut ranked = Vec::with_capacity(self.classes.len());
                for (order, class) in self.classes.iter().enumerate() {
                    let (tier, required) = specificity(&root, class.node()?);
                    ranked.push(Ranked {
                        tier,
                        required,
                        order,
                    });
                }
                ranked.sort_by_key(|r| (r.tier, Reverse(r.required), r.order));
                tracing::trace!(
                    family = %self.family.name(),
                    order = ?ranked.iter().map(|r| self.classes[r.order].name()).collect::<Vec<_>>(),
                    "dispatch order"
                );
                Ok(ranked.into_iter().map(|r| r.order).collect())
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

fn property_node(node: &Node, key: &str) -> Option<NodeId> {
    node.property(key)
        .or_else(|| {
            node.pattern_properties
                .iter()
                .find(|(re, _)| re.is_match(key))
                .map(|(_, id)| *id)
        })
        .or(match node.additional_properties {
            Additional::Schema(id) => Some(id),
            _ => None,
        })
}

/// Specificity tier and required-property count of a class node.
pub fn specificity(root: &RootSchema, id: NodeId) -> (Specificity, usize) {
    let graph = root.graph();
    let Some(node) = graph.node(graph.resolve(id)) else {
        return (Specificity::Unconstrained, 0);
    };
    let required = node.required.len();
    let tier = if node.constant.is_some() || node.enumeration.is_some() {
        Specificity::Literal
    } else if node.types.contains(&JsonType::Object) || !node.properties.is_empty() {
        if matches!(node.additional_properties, Additional::Forbidden) {
            Specificity::ClosedObject
        } else {
            Specificity::OpenObject
        }
    } else if !node.types.is_empty() {
        Specificity::Typed
    } else if !node.any_of.is_empty() || !node.one_of.is_empty() {
        Specificity::Union
    } else if node.is_unconstrained() {
        Specificity::Unconstrained
    } else {
        Specificity::Typed
    };
    (tier, required)
}
