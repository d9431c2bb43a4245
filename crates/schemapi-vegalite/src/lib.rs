//! # schemapi-vegalite — Vega-Lite Wrappers
//!
//! Typed wrappers for a bundled subset of the Vega-Lite v5 schema. The
//! schema document is compiled into the binary and loaded on first use;
//! every class below validates against it.
//!
//! ```text
//! use schemapi_vegalite::{AggregatedFieldDef, SchemaWrapper};
//!
//! let def = AggregatedFieldDef::new().op("sum").field("x").as_("total");
//! def.to_dict()?;   // {"op": "sum", "field": "x", "as": "total"}
//! ```
//!
//! Parsed specifications are turned back into typed objects with
//! [`load_spec`] or through [`registry`].

use std::sync::OnceLock;

use schemapi_object::{schema_class, ClassRegistry, SchemaClass, SchemaObject, SchemapiError};
use serde_json::Value;

pub use schemapi_object::{Prop, SchemaWrapper, Undefined, UNDEFINED};

/// The bundled schema family.
pub static VEGALITE: schemapi_object::SchemaFamily = schemapi_object::SchemaFamily::embedded(
    "vega-lite",
    include_str!("../schemas/vega-lite.subset.json"),
);

schema_class! {
    /// The whole document: any top-level specification.
    pub struct Root(value) in VEGALITE => root;
}

schema_class! {
    /// A top-level specification.
    pub struct TopLevelSpec(value) in VEGALITE => "TopLevelSpec";
}

schema_class! {
    /// A unit or layered specification.
    pub struct Spec(value) in VEGALITE => "Spec";
}

schema_class! {
    /// A single view with one mark.
    pub struct UnitSpec in VEGALITE => "UnitSpec" {
        /// URL of the Vega-Lite schema the spec was written against.
        schema: "$schema",
        mark: "mark",
        data: "data",
        transform: "transform",
        title: "title",
        description: "description",
        width: "width",
        height: "height",
    }
}

schema_class! {
    /// Views drawn on top of each other.
    pub struct LayerSpec in VEGALITE => "LayerSpec" {
        /// URL of the Vega-Lite schema the spec was written against.
        schema: "$schema",
        layer: "layer",
        data: "data",
        transform: "transform",
        title: "title",
        description: "description",
        width: "width",
        height: "height",
    }
}

schema_class! {
    /// A mark name or a full mark definition.
    pub struct AnyMark(value) in VEGALITE => "AnyMark";
}

schema_class! {
    /// Mark type.
    pub struct Mark(value) in VEGALITE => "Mark";
}

schema_class! {
    /// A mark with properties.
    pub struct MarkDef in VEGALITE => "MarkDef" {
        type_: "type",
        align: "align",
        color: "color",
        opacity: "opacity",
        tooltip: "tooltip",
    }
}

schema_class! {
    /// Horizontal text alignment.
    pub struct Align(value) in VEGALITE => "Align";
}

schema_class! {
    /// Inline values or a URL.
    pub struct Data in VEGALITE => "Data" {
        url: "url",
        values: "values",
        name: "name",
    }
}

schema_class! {
    /// A data field name.
    pub struct FieldName(value) in VEGALITE => "FieldName";
}

schema_class! {
    /// Any data transform.
    pub struct Transform(value) in VEGALITE => "Transform";
}

schema_class! {
    /// Group and aggregate rows.
    pub struct AggregateTransform in VEGALITE => "AggregateTransform" {
        aggregate: "aggregate",
        groupby: "groupby",
    }
}

schema_class! {
    /// One aggregation: an operation, its input field and output name.
    pub struct AggregatedFieldDef in VEGALITE => "AggregatedFieldDef" {
        op: "op",
        field: "field",
        /// Output field name.
        as_: "as",
    }
}

schema_class! {
    /// Aggregation operation.
    pub struct AggregateOp(value) in VEGALITE => "AggregateOp";
}

schema_class! {
    /// Keep rows matching a predicate.
    pub struct FilterTransform in VEGALITE => "FilterTransform" {
        filter: "filter",
    }
}

schema_class! {
    /// A predicate or a boolean combination of predicates.
    pub struct PredicateComposition(value) in VEGALITE => "PredicateComposition";
}

schema_class! {
    pub struct LogicalNot in VEGALITE => "LogicalNot" {
        not: "not",
    }
}

schema_class! {
    pub struct LogicalAnd in VEGALITE => "LogicalAnd" {
        and: "and",
    }
}

schema_class! {
    pub struct LogicalOr in VEGALITE => "LogicalOr" {
        or: "or",
    }
}

schema_class! {
    /// A field test or an expression string.
    pub struct Predicate(value) in VEGALITE => "Predicate";
}

schema_class! {
    /// `field == equal`.
    pub struct FieldEqualPredicate in VEGALITE => "FieldEqualPredicate" {
        field: "field",
        equal: "equal",
    }
}

schema_class! {
    /// `range[0] <= field <= range[1]`; a null bound is open.
    pub struct FieldRangePredicate in VEGALITE => "FieldRangePredicate" {
        field: "field",
        range: "range",
    }
}

/// Descriptors of every wrapper class in this crate.
pub fn classes() -> Vec<&'static SchemaClass> {
    vec![
        Root::class(),
        TopLevelSpec::class(),
        Spec::class(),
        UnitSpec::class(),
        LayerSpec::class(),
        AnyMark::class(),
        Mark::class(),
        MarkDef::class(),
        Align::class(),
        Data::class(),
        FieldName::class(),
        Transform::class(),
        AggregateTransform::class(),
        AggregatedFieldDef::class(),
        AggregateOp::class(),
        FilterTransform::class(),
        PredicateComposition::class(),
        LogicalNot::class(),
        LogicalAnd::class(),
        LogicalOr::class(),
        Predicate::class(),
        FieldEqualPredicate::class(),
        FieldRangePredicate::class(),
    ]
}

/// The registry of every class in [`classes`], built once.
pub fn registry() -> &'static ClassRegistry {
    static REGISTRY: OnceLock<ClassRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = ClassRegistry::new(&VEGALITE);
        for class in classes() {
            if let Err(e) = registry.register(class) {
                tracing::error!(class = class.name(), error = %e, "skipping class");
            }
        }
        registry
    })
}

/// Validate a parsed specification and rebuild it as typed objects.
///
/// # Errors
///
/// `SchemapiError::Validation` if the document is not a valid
/// specification, or the schema's load error.
pub fn load_spec(value: &Value) -> Result<SchemaObject, SchemapiError> {
    registry().from_dict(TopLevelSpec::class(), value, true)
}
