//! # Validation
//!
//! Checks a JSON instance against a node of a compiled [`SchemaGraph`] and
//! reports every violation with the path into the instance, the pointer of
//! the schema rule that failed, and a message a person can act on.
//!
//! ## `anyOf` diagnostics
//!
//! When no alternative of an `anyOf` matches, reporting the first branch is
//! useless if the author obviously meant the third. Each failing branch is
//! ranked by
//!
//! 1. whether the instance even has a type the branch accepts,
//! 2. how many of the instance's keys the branch declares as properties,
//! 3. how deep into the instance the branch got before failing,
//! 4. how few violations the branch produced,
//!
//! and the composite error carries the winning branch's violations. Ties go
//! to the branch declared first. Reordering alternatives never changes
//! whether validation passes, only which branch a failure points at.
//!
//! ## Recursion
//!
//! Recursive definitions are cycles in the graph. Descending into the
//! instance always terminates for a finite instance. A `$ref` loop that
//! does not descend is caught by a seen-set of (node, instance address)
//! pairs on the active stack and fails that branch; `max_depth` bounds
//! everything else.

use std::collections::HashSet;
use std::fmt;

use schemapi_core::InstancePath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::graph::{Additional, Items, JsonType, Node, NodeId, SchemaGraph};

/// Default [`ValidatorOptions::max_depth`]. Stays well inside a 2 MiB
/// thread stack in unoptimized builds.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorOptions {
    /// Bound on nested schema checks in one validation run. Every `$ref`,
    /// combinator branch and child value counts as one level, so this also
    /// bounds the stack a run uses.
    pub max_depth: usize,
    /// Report every violation; when false, stop at the first.
    pub collect_all: bool,
    /// Evaluate `pattern` and `patternProperties` regular expressions.
    pub check_patterns: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            collect_all: true,
            check_patterns: true,
        }
    }
}

/// The rule a violation broke.
#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    /// `type` mismatch.
    Type {
        /// Accepted types.
        expected: Vec<JsonType>,
        /// Type of the instance.
        actual: JsonType,
    },
    /// Value outside an `enum`.
    Enum {
        /// The allowed values.
        allowed: Vec<Value>,
    },
    /// Value differs from `const`.
    Const {
        /// The required value.
        expected: Value,
    },
    /// A `required` property is missing.
    Required {
        /// Missing property name.
        property: String,
    },
    /// A property not allowed by `additionalProperties: false`.
    AdditionalProperty {
        /// The unexpected key.
        property: String,
        /// Declared property names.
        allowed: Vec<String>,
    },
    /// `minProperties` / `maxProperties`.
    PropertyCount,
    /// `minItems` / `maxItems` / `additionalItems: false`.
    ItemCount,
    /// `uniqueItems`.
    UniqueItems,
    /// `minLength` / `maxLength`.
    Length,
    /// `pattern`.
    Pattern {
        /// The regular expression.
        pattern: String,
    },
    /// `minimum` / `maximum` and the exclusive forms.
    Range,
    /// `multipleOf`.
    MultipleOf,
    /// No `anyOf` alternative matched.
    AnyOf {
        /// Zero-based index of the closest alternative.
        branch: usize,
        /// Number of alternatives.
        branches: usize,
        /// Violations of the closest alternative.
        best: Vec<Violation>,
    },
    /// `oneOf` matched zero or several alternatives.
    OneOf {
        /// How many alternatives matched.
        matched: usize,
        /// Violations of the closest alternative when none matched.
        best: Vec<Violation>,
    },
    /// The instance matched a `not` schema.
    Not,
    /// The `false` schema.
    FalseSchema,
    /// Nesting exceeded `max_depth`.
    RecursionLimit,
    /// A `$ref` cycle reached the same node on the same value without
    /// descending into it.
    CircularReference,
    /// The schema node does not exist in this graph.
    UnknownSchema,
}

/// A single violation.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Where in the instance the rule failed.
    pub instance_path: InstancePath,
    /// JSON Pointer of the failing keyword within the schema.
    pub schema_path: String,
    /// What was violated.
    pub kind: ViolationKind,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// Follow composite violations down to the most specific one.
    pub fn most_specific(&self) -> &Violation {
        match &self.kind {
            ViolationKind::AnyOf { best, .. } | ViolationKind::OneOf { best, .. } => best
                .iter()
                .map(Violation::most_specific)
                .max_by_key(|v| v.instance_path.depth())
                .unwrap_or(self),
            _ => self,
        }
    }

    /// All leaf violations, descending into composite ones.
    pub fn leaves(&self) -> Vec<&Violation> {
        match &self.kind {
            ViolationKind::AnyOf { best, .. } | ViolationKind::OneOf { best, .. }
                if !best.is_empty() =>
            {
                best.iter().flat_map(Violation::leaves).collect()
            }
            _ => vec![self],
        }
    }

    fn deepest(&self) -> usize {
        self.leaves()
            .iter()
            .map(|v| v.instance_path.depth())
            .max()
            .unwrap_or(0)
    }

    /// True if the violation only says the instance has the wrong type at
    /// `depth`, i.e. the schema never got to look inside it.
    fn is_shallow_type_mismatch(&self, depth: usize) -> bool {
        match &self.kind {
            ViolationKind::Type { .. } | ViolationKind::Enum { .. } | ViolationKind::Const { .. } => {
                self.instance_path.depth() == depth
            }
            ViolationKind::AnyOf { best, .. } => {
                !best.is_empty() && best.iter().all(|v| v.is_shallow_type_mismatch(depth))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}: {}", self.instance_path, self.message)
    }
}

/// Validation failure: the schema that was checked and every violation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("validation failed against '{schema}':\n{}", render(.violations))]
pub struct ValidationError {
    /// Schema the instance was checked against (pointer or definition).
    pub schema: String,
    violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl ValidationError {
    /// Build from a non-empty list of violations.
    pub fn new(schema: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self {
            schema: schema.into(),
            violations,
        }
    }

    /// Failure to find the named schema at all.
    pub fn unknown_schema(name: &str) -> Self {
        Self::new(
            name,
            vec![Violation {
                instance_path: InstancePath::root(),
                schema_path: name.to_string(),
                kind: ViolationKind::UnknownSchema,
                message: format!("no schema named '{name}'"),
            }],
        )
    }

    /// Number of top-level violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns true if there are no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// The top-level violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Consumes self and returns the violations.
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    /// The most specific violation of the first failure, which is the one a
    /// user should look at first.
    pub fn primary(&self) -> Option<&Violation> {
        self.violations.first().map(Violation::most_specific)
    }

    /// Re-root every violation under `parent`, for errors produced while
    /// validating a value nested inside a larger document.
    pub fn prefixed(mut self, parent: &InstancePath) -> Self {
        fn walk(v: &mut Violation, parent: &InstancePath) {
            v.instance_path = v.instance_path.prefixed(parent);
            if let ViolationKind::AnyOf { best, .. } | ViolationKind::OneOf { best, .. } = &mut v.kind {
                for inner in best {
                    walk(inner, parent);
                }
            }
        }
        for v in &mut self.violations {
            walk(v, parent);
        }
        self
    }
}

/// Validates instances against nodes of one schema graph.
#[derive(Debug, Clone)]
pub struct Validator<'g> {
    graph: &'g SchemaGraph,
    options: ValidatorOptions,
}

struct Context {
    depth: usize,
    active: HashSet<(NodeId, usize)>,
}

impl<'g> Validator<'g> {
    /// A validator with default options.
    pub fn new(graph: &'g SchemaGraph) -> Self {
        Self::with_options(graph, ValidatorOptions::default())
    }

    /// A validator with explicit options.
    pub fn with_options(graph: &'g SchemaGraph, options: ValidatorOptions) -> Self {
        Self { graph, options }
    }

    /// The options in effect.
    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Validate `instance` against `node`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every violation (or only the
    /// first, with `collect_all: false`).
    pub fn validate(&self, node: NodeId, instance: &Value) -> Result<(), ValidationError> {
        let violations = self.violations(node, instance);
        if violations.is_empty() {
            return Ok(());
        }
        let resolved = self.graph.resolve(node);
        let schema = self
            .graph
            .definition_name(resolved)
            .and_then(|_| self.graph.node(resolved))
            .or_else(|| self.graph.node(node))
            .map(|n| n.pointer.clone())
            .unwrap_or_else(|| format!("node {}", node.index()));
        tracing::debug!(
            schema = %schema,
            violations = violations.len(),
            "instance failed validation"
        );
        Err(ValidationError::new(schema, violations))
    }

    /// Validate `instance` against the document root.
    ///
    /// # Errors
    ///
    /// See [`Validator::validate`].
    pub fn validate_root(&self, instance: &Value) -> Result<(), ValidationError> {
        self.validate(self.graph.root(), instance)
    }

    /// Whether `instance` satisfies `node`.
    pub fn is_valid(&self, node: NodeId, instance: &Value) -> bool {
        let strict = Self {
            graph: self.graph,
            options: ValidatorOptions {
                collect_all: false,
                ..self.options.clone()
            },
        };
        strict.violations(node, instance).is_empty()
    }

    /// Every violation of `instance` against `node`.
    pub fn violations(&self, node: NodeId, instance: &Value) -> Vec<Violation> {
        let mut ctx = Context {
            depth: 0,
            active: HashSet::new(),
        };
        let mut out = Vec::new();
        self.check(&mut ctx, node, instance, &InstancePath::root(), &mut out);
        out
    }

    fn done(&self, out: &[Violation]) -> bool {
        !self.options.collect_all && !out.is_empty()
    }

    fn check(
        &self,
        ctx: &mut Context,
        id: NodeId,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        let Some(node) = self.graph.node(id) else {
            out.push(Violation {
                instance_path: path.clone(),
                schema_path: format!("node {}", id.index()),
                kind: ViolationKind::UnknownSchema,
                message: format!("schema node {} does not exist", id.index()),
            });
            return;
        };

        if ctx.depth >= self.options.max_depth {
            out.push(violation(
                path,
                &node,
                "",
                ViolationKind::RecursionLimit,
                format!("nesting exceeds the maximum depth of {}", self.options.max_depth),
            ));
            return;
        }
        let key = (id, instance as *const Value as usize);
        if !ctx.active.insert(key) {
            out.push(violation(
                path,
                &node,
                "",
                ViolationKind::CircularReference,
                format!("circular reference through {} never reaches a constraint", node.pointer),
            ));
            return;
        }
        ctx.depth += 1;
        self.check_node(ctx, &node, instance, path, out);
        ctx.depth -= 1;
        ctx.active.remove(&key);
    }

    fn check_node(
        &self,
        ctx: &mut Context,
        node: &Node,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        if let Some(allowed) = node.boolean {
            if !allowed {
                out.push(violation(
                    path,
                    node,
                    "",
                    ViolationKind::FalseSchema,
                    format!("{} is not allowed here", summarize(instance)),
                ));
            }
            return;
        }

        if let Some(target) = node.reference {
            self.check(ctx, target, instance, path, out);
            if self.done(out) {
                return;
            }
        }

        if !node.types.is_empty() && !node.types.iter().any(|t| t.matches(instance)) {
            let actual = JsonType::of(instance);
            let expected = node
                .types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            out.push(violation(
                path,
                node,
                "type",
                ViolationKind::Type {
                    expected: node.types.clone(),
                    actual,
                },
                format!(
                    "{} is not of type {expected} (found {})",
                    summarize(instance),
                    if actual == JsonType::Integer { "number" } else { actual.as_str() }
                ),
            ));
            return;
        }

        if let Some(expected) = &node.constant {
            if !json_equal(expected, instance) {
                out.push(violation(
                    path,
                    node,
                    "const",
                    ViolationKind::Const {
                        expected: expected.clone(),
                    },
                    format!("{} was expected, found {}", summarize(expected), summarize(instance)),
                ));
            }
        }
        if let Some(allowed) = &node.enumeration {
            if !allowed.iter().any(|v| json_equal(v, instance)) {
                let listed = allowed.iter().map(summarize).collect::<Vec<_>>().join(", ");
                out.push(violation(
                    path,
                    node,
                    "enum",
                    ViolationKind::Enum {
                        allowed: allowed.clone(),
                    },
                    format!("{} is not one of [{listed}]", summarize(instance)),
                ));
            }
        }
        if self.done(out) {
            return;
        }

        if !node.any_of.is_empty() {
            self.check_any_of(ctx, node, instance, path, out);
            if self.done(out) {
                return;
            }
        }
        if !node.one_of.is_empty() {
            self.check_one_of(ctx, node, instance, path, out);
            if self.done(out) {
                return;
            }
        }
        for sub in &node.all_of {
            self.check(ctx, *sub, instance, path, out);
            if self.done(out) {
                return;
            }
        }
        if let Some(not) = node.not {
            let mut scratch = Vec::new();
            self.check(ctx, not, instance, path, &mut scratch);
            if scratch.is_empty() {
                out.push(violation(
                    path,
                    node,
                    "not",
                    ViolationKind::Not,
                    format!("{} must not match the schema at {}", summarize(instance), self.pointer_of(not)),
                ));
            }
        }

        match instance {
            Value::Object(map) => self.check_object(ctx, node, map, path, out),
            Value::Array(items) => self.check_array(ctx, node, items, path, out),
            Value::String(s) => self.check_string(node, s, instance, path, out),
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    self.check_number(node, f, instance, path, out);
                }
            }
            Value::Null | Value::Bool(_) => {}
        }
    }

    fn check_any_of(
        &self,
        ctx: &mut Context,
        node: &Node,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        let mut failures = Vec::with_capacity(node.any_of.len());
        for alt in &node.any_of {
            let mut errs = Vec::new();
            self.check(ctx, *alt, instance, path, &mut errs);
            if errs.is_empty() {
                return;
            }
            failures.push(errs);
        }
        let branch = self.best_branch(&node.any_of, &failures, instance, path);
        let best = failures.swap_remove(branch);
        let detail = best
            .first()
            .map(|v| {
                let v = v.most_specific();
                format!("{}: {}", v.instance_path, v.message)
            })
            .unwrap_or_default();
        out.push(violation(
            path,
            node,
            "anyOf",
            ViolationKind::AnyOf {
                branch,
                branches: node.any_of.len(),
                best,
            },
            format!(
                "{} is not valid under any of the {} alternatives; closest match is {} (alternative {}): {detail}",
                summarize(instance),
                node.any_of.len(),
                self.pointer_of(node.any_of[branch]),
                branch + 1,
            ),
        ));
    }

    fn check_one_of(
        &self,
        ctx: &mut Context,
        node: &Node,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        let mut failures = Vec::new();
        let mut matched = 0usize;
        for alt in &node.one_of {
            let mut errs = Vec::new();
            self.check(ctx, *alt, instance, path, &mut errs);
            if errs.is_empty() {
                matched += 1;
            }
            failures.push(errs);
        }
        if matched == 1 {
            return;
        }
        if matched == 0 {
            let branch = self.best_branch(&node.one_of, &failures, instance, path);
            let best = failures.swap_remove(branch);
            out.push(violation(
                path,
                node,
                "oneOf",
                ViolationKind::OneOf { matched, best },
                format!(
                    "{} is not valid under any of the {} alternatives; closest match is {}",
                    summarize(instance),
                    node.one_of.len(),
                    self.pointer_of(node.one_of[branch]),
                ),
            ));
        } else {
            out.push(violation(
                path,
                node,
                "oneOf",
                ViolationKind::OneOf {
                    matched,
                    best: Vec::new(),
                },
                format!(
                    "{} is valid under {matched} of the alternatives but must match exactly one",
                    summarize(instance)
                ),
            ));
        }
    }

    /// Pick the failing alternative that most plausibly reflects what the
    /// author meant.
    fn best_branch(
        &self,
        alternatives: &[NodeId],
        failures: &[Vec<Violation>],
        instance: &Value,
        path: &InstancePath,
    ) -> usize {
        let depth = path.depth();
        let mut best: Option<(usize, (bool, usize, usize, isize))> = None;
        for (i, (alt, errs)) in alternatives.iter().zip(failures).enumerate() {
            let type_compatible = !errs.iter().all(|v| v.is_shallow_type_mismatch(depth));
            let overlap = self.property_overlap(*alt, instance);
            let deepest = errs.iter().map(Violation::deepest).max().unwrap_or(0);
            let count = errs.iter().map(|v| v.leaves().len()).sum::<usize>();
            let score = (
                type_compatible,
                overlap,
                deepest,
                -(isize::try_from(count).unwrap_or(isize::MAX)),
            );
            tracing::trace!(
                branch = i,
                schema = %self.pointer_of(*alt),
                ?score,
                "ranked failing alternative"
            );
            if best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((i, score));
            }
        }
        best.map_or(0, |(i, _)| i)
    }

    /// Number of the instance's keys that an alternative declares.
    fn property_overlap(&self, alt: NodeId, instance: &Value) -> usize {
        let Value::Object(map) = instance else {
            return 0;
        };
        let declared = self.graph.property_names(alt);
        map.keys().filter(|k| declared.iter().any(|d| d == *k)).count()
    }

    fn pointer_of(&self, id: NodeId) -> String {
        let resolved = self.graph.resolve(id);
        self.graph
            .node(resolved)
            .map(|n| n.pointer.clone())
            .unwrap_or_else(|| format!("node {}", id.index()))
    }

    fn check_object(
        &self,
        ctx: &mut Context,
        node: &Node,
        map: &serde_json::Map<String, Value>,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        for name in &node.required {
            if !map.contains_key(name) {
                out.push(violation(
                    path,
                    node,
                    "required",
                    ViolationKind::Required {
                        property: name.clone(),
                    },
                    format!("\"{name}\" is a required property"),
                ));
                if self.done(out) {
                    return;
                }
            }
        }
        if let Some(min) = node.min_properties {
            if map.len() < min {
                out.push(violation(
                    path,
                    node,
                    "minProperties",
                    ViolationKind::PropertyCount,
                    format!("expected at least {min} properties, found {}", map.len()),
                ));
            }
        }
        if let Some(max) = node.max_properties {
            if map.len() > max {
                out.push(violation(
                    path,
                    node,
                    "maxProperties",
                    ViolationKind::PropertyCount,
                    format!("expected at most {max} properties, found {}", map.len()),
                ));
            }
        }

        for (key, value) in map {
            if self.done(out) {
                return;
            }
            let child = path.child_key(key.as_str());
            let mut covered = false;
            if let Some(sub) = node.property(key) {
                covered = true;
                self.check(ctx, sub, value, &child, out);
            }
            for (regex, sub) in &node.pattern_properties {
                if !self.options.check_patterns {
                    covered = true;
                    continue;
                }
                if regex.is_match(key) {
                    covered = true;
                    self.check(ctx, *sub, value, &child, out);
                }
            }
            if covered {
                continue;
            }
            match node.additional_properties {
                Additional::Allowed => {}
                Additional::Schema(sub) => self.check(ctx, sub, value, &child, out),
                Additional::Forbidden => {
                    let allowed: Vec<String> =
                        node.properties.iter().map(|(k, _)| k.clone()).collect();
                    let hint = if allowed.is_empty() {
                        "no properties are declared".to_string()
                    } else {
                        format!("valid properties are: {}", allowed.join(", "))
                    };
                    out.push(violation(
                        path,
                        node,
                        "additionalProperties",
                        ViolationKind::AdditionalProperty {
                            property: key.clone(),
                            allowed,
                        },
                        format!("additional property \"{key}\" is not allowed; {hint}"),
                    ));
                }
            }
        }
    }

    fn check_array(
        &self,
        ctx: &mut Context,
        node: &Node,
        items: &[Value],
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        if let Some(min) = node.min_items {
            if items.len() < min {
                out.push(violation(
                    path,
                    node,
                    "minItems",
                    ViolationKind::ItemCount,
                    format!("expected at least {min} items, found {}", items.len()),
                ));
            }
        }
        if let Some(max) = node.max_items {
            if items.len() > max {
                out.push(violation(
                    path,
                    node,
                    "maxItems",
                    ViolationKind::ItemCount,
                    format!("expected at most {max} items, found {}", items.len()),
                ));
            }
        }
        if node.unique_items {
            'outer: for (i, a) in items.iter().enumerate() {
                for b in &items[i + 1..] {
                    if json_equal(a, b) {
                        out.push(violation(
                            path,
                            node,
                            "uniqueItems",
                            ViolationKind::UniqueItems,
                            format!("{} appears more than once", summarize(a)),
                        ));
                        break 'outer;
                    }
                }
            }
        }
        match &node.items {
            Items::Any => {}
            Items::Single(sub) => {
                for (i, item) in items.iter().enumerate() {
                    if self.done(out) {
                        return;
                    }
                    self.check(ctx, *sub, item, &path.child_index(i), out);
                }
            }
            Items::Tuple(subs) => {
                for (i, item) in items.iter().enumerate() {
                    if self.done(out) {
                        return;
                    }
                    let child = path.child_index(i);
                    match subs.get(i) {
                        Some(sub) => self.check(ctx, *sub, item, &child, out),
                        None => match node.additional_items {
                            Additional::Allowed => {}
                            Additional::Schema(sub) => self.check(ctx, sub, item, &child, out),
                            Additional::Forbidden => {
                                out.push(violation(
                                    path,
                                    node,
                                    "additionalItems",
                                    ViolationKind::ItemCount,
                                    format!(
                                        "expected at most {} items, found {}",
                                        subs.len(),
                                        items.len()
                                    ),
                                ));
                                return;
                            }
                        },
                    }
                }
            }
        }
    }

    fn check_string(
        &self,
        node: &Node,
        s: &str,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        let len = s.chars().count();
        if let Some(min) = node.min_length {
            if len < min {
                out.push(violation(
                    path,
                    node,
                    "minLength",
                    ViolationKind::Length,
                    format!("{} is shorter than {min} characters", summarize(instance)),
                ));
            }
        }
        if let Some(max) = node.max_length {
            if len > max {
                out.push(violation(
                    path,
                    node,
                    "maxLength",
                    ViolationKind::Length,
                    format!("{} is longer than {max} characters", summarize(instance)),
                ));
            }
        }
        if let Some(regex) = &node.pattern {
            if self.options.check_patterns && !regex.is_match(s) {
                out.push(violation(
                    path,
                    node,
                    "pattern",
                    ViolationKind::Pattern {
                        pattern: regex.as_str().to_string(),
                    },
                    format!("{} does not match pattern \"{}\"", summarize(instance), regex.as_str()),
                ));
            }
        }
    }

    fn check_number(
        &self,
        node: &Node,
        f: f64,
        instance: &Value,
        path: &InstancePath,
        out: &mut Vec<Violation>,
    ) {
        let shown = summarize(instance);
        let mut range = |keyword: &str, message: String| {
            out.push(violation(path, node, keyword, ViolationKind::Range, message));
        };
        if let Some(min) = node.minimum {
            if f < min {
                range("minimum", format!("{shown} is less than the minimum of {min}"));
            }
        }
        if let Some(max) = node.maximum {
            if f > max {
                range("maximum", format!("{shown} is greater than the maximum of {max}"));
            }
        }
        if let Some(min) = node.exclusive_minimum {
            if f <= min {
                range(
                    "exclusiveMinimum",
                    format!("{shown} is less than or equal to the exclusive minimum of {min}"),
                );
            }
        }
        if let Some(max) = node.exclusive_maximum {
            if f >= max {
                range(
                    "exclusiveMaximum",
                    format!("{shown} is greater than or equal to the exclusive maximum of {max}"),
                );
            }
        }
        if let Some(m) = node.multiple_of {
            let q = f / m;
            if (q - q.round()).abs() > 1e-9 {
                out.push(violation(
                    path,
                    node,
                    "multipleOf",
                    ViolationKind::MultipleOf,
                    format!("{shown} is not a multiple of {m}"),
                ));
            }
        }
    }
}

fn violation(
    path: &InstancePath,
    node: &Node,
    keyword: &str,
    kind: ViolationKind,
    message: String,
) -> Violation {
    let schema_path = if keyword.is_empty() {
        node.pointer.clone()
    } else {
        format!("{}/{keyword}", node.pointer)
    };
    Violation {
        instance_path: path.clone(),
        schema_path,
        kind,
        message,
    }
}

/// JSON equality where `1` and `1.0` are the same number.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| json_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| json_equal(v, w)))
        }
        _ => a == b,
    }
}

/// Compact JSON rendering of a value for messages, truncated when long.
fn summarize(value: &Value) -> String {
    const LIMIT: usize = 60;
    let text = value.to_string();
    if text.chars().count() <= LIMIT {
        text
    } else {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(doc: Value) -> SchemaGraph {
        SchemaGraph::compile("test", doc).unwrap()
    }

    fn def_errors(g: &SchemaGraph, name: &str, instance: Value) -> Vec<Violation> {
        Validator::new(g).violations(g.definition(name).unwrap(), &instance)
    }

    fn predicate_doc() -> Value {
        json!({"definitions": {
            "Predicate": {"anyOf": [
                {"$ref": "#/definitions/FieldEqualPredicate"},
                {"$ref": "#/definitions/FieldRangePredicate"}
            ]},
            "FieldEqualPredicate": {
                "type": "object",
                "properties": {"field": {"type": "string"}, "equal": {"type": ["string", "number", "boolean"]}},
                "required": ["field", "equal"],
                "additionalProperties": false
            },
            "FieldRangePredicate": {
                "type": "object",
                "properties": {
                    "field": {"type": "string"},
                    "range": {"type": "array", "items": {"type": "number"}, "minItems": 2, "maxItems": 2}
                },
                "required": ["field", "range"],
                "additionalProperties": false
            }
        }})
    }

    #[test]
    fn test_enum_violation_lists_allowed_values() {
        let g = graph(json!({"definitions": {"Align": {"type": "string", "enum": ["left", "center", "right"]}}}));
        let errs = def_errors(&g, "Align", json!("middle"));
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].kind, ViolationKind::Enum { .. }));
        assert_eq!(
            errs[0].message,
            r#""middle" is not one of ["left", "center", "right"]"#
        );
        assert_eq!(errs[0].schema_path, "#/definitions/Align/enum");
    }

    #[test]
    fn test_type_violation_names_expected_and_actual() {
        let g = graph(json!({"definitions": {"S": {"type": "string"}}}));
        let errs = def_errors(&g, "S", json!(5));
        assert_eq!(errs[0].message, "5 is not of type string (found number)");
        match &errs[0].kind {
            ViolationKind::Type { expected, actual } => {
                assert_eq!(expected, &vec![JsonType::String]);
                assert_eq!(*actual, JsonType::Integer);
            }
            other => panic!("Expected Type, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_path_is_reported() {
        let g = graph(json!({"definitions": {
            "Spec": {"type": "object", "properties": {
                "encoding": {"type": "object", "properties": {
                    "x": {"type": "object", "properties": {
                        "scale": {"type": "object", "properties": {
                            "domain": {"type": "array", "items": {"type": "number"}}
                        }}
                    }}
                }}
            }}
        }}));
        let errs = def_errors(&g, "Spec", json!({"encoding": {"x": {"scale": {"domain": [0, 1, "two"]}}}}));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].instance_path.to_dotted(), "encoding.x.scale.domain[2]");
        assert_eq!(errs[0].instance_path.to_pointer(), "/encoding/x/scale/domain/2");
    }

    #[test]
    fn test_required_and_additional_properties() {
        let g = graph(predicate_doc());
        let errs = def_errors(&g, "FieldEqualPredicate", json!({"field": "a", "bogus": 1}));
        let kinds: Vec<_> = errs.iter().map(|e| &e.kind).collect();
        assert!(kinds
            .iter()
            .any(|k| matches!(k, ViolationKind::Required { property } if property == "equal")));
        let additional = errs
            .iter()
            .find(|e| matches!(e.kind, ViolationKind::AdditionalProperty { .. }))
            .unwrap();
        assert!(additional.message.contains("\"bogus\""));
        assert!(additional.message.contains("valid properties are: equal, field"));
    }

    #[test]
    fn test_any_of_reports_closer_branch() {
        let g = graph(predicate_doc());
        // Has "range" so it is clearly meant as a range predicate.
        let errs = def_errors(&g, "Predicate", json!({"field": "x", "range": [0, "ten"]}));
        assert_eq!(errs.len(), 1);
        match &errs[0].kind {
            ViolationKind::AnyOf { branch, branches, best } => {
                assert_eq!(*branch, 1);
                assert_eq!(*branches, 2);
                assert_eq!(best[0].most_specific().instance_path.to_dotted(), "range[1]");
            }
            other => panic!("Expected AnyOf, got {other:?}"),
        }
        assert!(errs[0].message.contains("FieldRangePredicate"));
        assert_eq!(errs[0].most_specific().instance_path.to_dotted(), "range[1]");
    }

    #[test]
    fn test_any_of_prefers_type_compatible_branch() {
        let g = graph(json!({"definitions": {"U": {"anyOf": [
            {"type": "string"},
            {"type": "object", "properties": {"a": {"type": "number"}}, "required": ["a"]}
        ]}}}));
        let errs = def_errors(&g, "U", json!({"a": "nope"}));
        match &errs[0].kind {
            ViolationKind::AnyOf { branch, .. } => assert_eq!(*branch, 1),
            other => panic!("Expected AnyOf, got {other:?}"),
        }
    }

    #[test]
    fn test_any_of_outcome_is_order_independent() {
        let forward = graph(predicate_doc());
        let mut doc = predicate_doc();
        doc["definitions"]["Predicate"]["anyOf"]
            .as_array_mut()
            .unwrap()
            .reverse();
        let reversed = graph(doc);
        for instance in [
            json!({"field": "x", "equal": 3}),
            json!({"field": "x", "range": [1, 2]}),
            json!({"field": "x"}),
            json!("string"),
        ] {
            let a = def_errors(&forward, "Predicate", instance.clone()).is_empty();
            let b = def_errors(&reversed, "Predicate", instance).is_empty();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_recursive_schema_terminates() {
        let g = graph(json!({"definitions": {
            "Spec": {"anyOf": [{"$ref": "#/definitions/Unit"}, {"$ref": "#/definitions/Layer"}]},
            "Unit": {"type": "object", "properties": {"mark": {"type": "string"}}, "required": ["mark"]},
            "Layer": {"type": "object", "properties": {
                "layer": {"type": "array", "items": {"$ref": "#/definitions/Spec"}}
            }, "required": ["layer"]}
        }}));
        let ok = json!({"layer": [{"mark": "bar"}, {"layer": [{"mark": "line"}]}]});
        assert!(def_errors(&g, "Spec", ok).is_empty());
        let bad = json!({"layer": [{"mark": "bar"}, {"layer": [{"mark": 7}]}]});
        let errs = def_errors(&g, "Spec", bad);
        assert_eq!(errs.len(), 1);
        assert_eq!(
            errs[0].most_specific().instance_path.to_dotted(),
            "layer[1].layer[0].mark"
        );
    }

    #[test]
    fn test_pure_ref_loop_does_not_overflow() {
        let g = graph(json!({"definitions": {
            "A": {"anyOf": [{"$ref": "#/definitions/B"}, {"type": "string"}]},
            "B": {"$ref": "#/definitions/A"}
        }}));
        assert!(def_errors(&g, "A", json!("ok")).is_empty());
        assert!(!def_errors(&g, "A", json!(1)).is_empty());
    }

    #[test]
    fn test_max_depth_limit() {
        let g = graph(json!({"definitions": {
            "Tree": {"type": "array", "items": {"$ref": "#/definitions/Tree"}}
        }}));
        let mut deep = json!([]);
        for _ in 0..20 {
            deep = json!([deep]);
        }
        let options = ValidatorOptions {
            max_depth: 10,
            ..ValidatorOptions::default()
        };
        let errs = Validator::with_options(&g, options)
            .violations(g.definition("Tree").unwrap(), &deep);
        assert!(errs
            .iter()
            .any(|e| matches!(e.kind, ViolationKind::RecursionLimit)));
        assert!(def_errors(&g, "Tree", deep).is_empty());
    }

    #[test]
    fn test_default_depth_limit_reports_instead_of_overflowing() {
        let g = graph(json!({"definitions": {
            "Tree": {"type": "array", "items": {"$ref": "#/definitions/Tree"}}
        }}));
        // One check for the outer array, two more per nested array.
        let nested = |levels: usize| {
            let mut v = json!([]);
            for _ in 0..levels {
                v = json!([v]);
            }
            v
        };
        let within = (DEFAULT_MAX_DEPTH - 1) / 2;
        assert!(def_errors(&g, "Tree", nested(within)).is_empty());

        let errs = def_errors(&g, "Tree", nested(within + 1));
        assert_eq!(errs.len(), 1);
        assert!(matches!(errs[0].most_specific().kind, ViolationKind::RecursionLimit));

        let errs = def_errors(&g, "Tree", nested(DEFAULT_MAX_DEPTH * 4));
        assert!(matches!(errs[0].most_specific().kind, ViolationKind::RecursionLimit));
    }

    #[test]
    fn test_deep_union_failure_is_linear() {
        let g = graph(json!({"definitions": {
            "Spec": {"anyOf": [{"$ref": "#/definitions/Unit"}, {"$ref": "#/definitions/Layer"}]},
            "Unit": {"type": "object", "properties": {"mark": {"type": "string"}}, "required": ["mark"]},
            "Layer": {"type": "object", "properties": {
                "layer": {"type": "array", "items": {"$ref": "#/definitions/Spec"}}
            }, "required": ["layer"]}
        }}));
        let levels = 40;
        let mut spec = json!({"mark": 7});
        for _ in 0..levels {
            spec = json!({ "layer": [spec] });
        }

        let started = std::time::Instant::now();
        let errs = def_errors(&g, "Spec", spec);
        assert!(started.elapsed() < std::time::Duration::from_secs(5));

        let expected = format!("{}.mark", vec!["layer[0]"; levels].join("."));
        assert_eq!(errs.len(), 1);
        let leaf = errs[0].most_specific();
        assert_eq!(leaf.instance_path.to_dotted(), expected);
        assert!(matches!(leaf.kind, ViolationKind::Type { .. }));
        assert!(errs[0].message.contains("(alternative 2)"));
    }

    #[test]
    fn test_collect_all_false_stops_early() {
        let g = graph(json!({"definitions": {"O": {
            "type": "object",
            "required": ["a", "b", "c"]
        }}}));
        let id = g.definition("O").unwrap();
        assert_eq!(Validator::new(&g).violations(id, &json!({})).len(), 3);
        let first_only = Validator::with_options(
            &g,
            ValidatorOptions {
                collect_all: false,
                ..ValidatorOptions::default()
            },
        );
        assert_eq!(first_only.violations(id, &json!({})).len(), 1);
        assert!(!first_only.is_valid(id, &json!({})));
    }

    #[test]
    fn test_numeric_and_string_keywords() {
        let g = graph(json!({"definitions": {
            "N": {"type": "number", "minimum": 0, "exclusiveMaximum": 10, "multipleOf": 0.5},
            "S": {"type": "string", "minLength": 2, "maxLength": 4, "pattern": "^[a-z]+$"},
            "I": {"type": "integer"}
        }}));
        assert!(def_errors(&g, "N", json!(2.5)).is_empty());
        assert_eq!(def_errors(&g, "N", json!(-1)).len(), 1);
        assert_eq!(def_errors(&g, "N", json!(10)).len(), 1);
        assert!(matches!(def_errors(&g, "N", json!(0.3))[0].kind, ViolationKind::MultipleOf));
        assert!(def_errors(&g, "S", json!("abc")).is_empty());
        assert_eq!(def_errors(&g, "S", json!("a")).len(), 1);
        assert!(matches!(def_errors(&g, "S", json!("AB"))[0].kind, ViolationKind::Pattern { .. }));
        assert!(def_errors(&g, "I", json!(3)).is_empty());
        assert!(!def_errors(&g, "I", json!(3.5)).is_empty());
    }

    #[test]
    fn test_array_keywords() {
        let g = graph(json!({"definitions": {
            "Pair": {"type": "array", "items": [{"type": "string"}, {"type": "number"}], "additionalItems": false},
            "Set": {"type": "array", "uniqueItems": true}
        }}));
        assert!(def_errors(&g, "Pair", json!(["a", 1])).is_empty());
        assert_eq!(def_errors(&g, "Pair", json!([1, 1])).len(), 1);
        assert!(matches!(def_errors(&g, "Pair", json!(["a", 1, 2]))[0].kind, ViolationKind::ItemCount));
        assert!(matches!(def_errors(&g, "Set", json!([1, 2, 1.0]))[0].kind, ViolationKind::UniqueItems));
    }

    #[test]
    fn test_one_of_all_of_not_const() {
        let g = graph(json!({"definitions": {
            "One": {"oneOf": [{"type": "number"}, {"type": "integer"}]},
            "All": {"allOf": [{"type": "object"}, {"required": ["a"]}]},
            "NotNull": {"not": {"type": "null"}},
            "Five": {"const": 5}
        }}));
        assert!(def_errors(&g, "One", json!(1.5)).is_empty());
        assert!(matches!(
            def_errors(&g, "One", json!(1))[0].kind,
            ViolationKind::OneOf { matched: 2, .. }
        ));
        assert!(def_errors(&g, "All", json!({"a": 1})).is_empty());
        assert_eq!(def_errors(&g, "All", json!({})).len(), 1);
        assert!(matches!(def_errors(&g, "NotNull", json!(null))[0].kind, ViolationKind::Not));
        assert!(def_errors(&g, "Five", json!(5.0)).is_empty());
        assert!(matches!(def_errors(&g, "Five", json!(6))[0].kind, ViolationKind::Const { .. }));
    }

    #[test]
    fn test_pattern_properties_and_schema_additional() {
        let g = graph(json!({"definitions": {"M": {
            "type": "object",
            "patternProperties": {"^x-": {"type": "string"}},
            "additionalProperties": {"type": "number"}
        }}}));
        assert!(def_errors(&g, "M", json!({"x-note": "hi", "size": 3})).is_empty());
        let errs = def_errors(&g, "M", json!({"x-note": 1, "size": "big"}));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_validation_error_display_and_primary() {
        let g = graph(predicate_doc());
        let err = Validator::new(&g)
            .validate(
                g.definition("Predicate").unwrap(),
                &json!({"field": "x", "range": [0, "ten"]}),
            )
            .unwrap_err();
        assert_eq!(err.schema, "#/definitions/Predicate");
        let text = err.to_string();
        assert!(text.starts_with("validation failed against '#/definitions/Predicate':"));
        assert!(text.contains("(root):"));
        assert_eq!(err.primary().unwrap().instance_path.to_dotted(), "range[1]");

        let nested = err.prefixed(&InstancePath::root().child_key("filter"));
        assert_eq!(nested.primary().unwrap().instance_path.to_dotted(), "filter.range[1]");
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: ValidatorOptions = serde_json::from_value(json!({"max_depth": 32})).unwrap();
        assert_eq!(options.max_depth, 32);
        assert!(options.collect_all);
        assert!(serde_json::from_value::<ValidatorOptions>(json!({"bogus": 1})).is_err());
    }
}
