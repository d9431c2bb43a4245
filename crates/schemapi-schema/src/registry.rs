//! # Schema Registry
//!
//! A [`SchemaFamily`] names one root schema document and the classes cut
//! from it. The family loads and compiles its document lazily, exactly once
//! per process, through a `OnceLock`; concurrent first use blocks on the
//! single initializer instead of loading twice. The outcome is cached either
//! way, so a broken packaged document fails fast on first access and keeps
//! failing with the same error.
//!
//! After the first load the [`RootSchema`] is shared read-only behind an
//! `Arc`.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use schemapi_core::SchemaLoadError;
use serde_json::Value;

use crate::graph::{NodeId, SchemaGraph};
use crate::loader::SchemaSource;
use crate::validate::{ValidationError, Validator, ValidatorOptions};

/// A parsed and compiled root schema document.
#[derive(Debug)]
pub struct RootSchema {
    graph: SchemaGraph,
}

impl RootSchema {
    /// Compile an already-parsed document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaLoadError::InvalidSchema` if the document is not a
    /// usable schema.
    pub fn new(family: impl Into<String>, document: Value) -> Result<Self, SchemaLoadError> {
        Ok(Self {
            graph: SchemaGraph::compile(family, document)?,
        })
    }

    /// Schema family name.
    pub fn family(&self) -> &str {
        self.graph.family()
    }

    /// The document as parsed.
    pub fn document(&self) -> &Value {
        self.graph.document()
    }

    /// The compiled node graph.
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    /// Node for a named definition.
    pub fn definition(&self, name: &str) -> Option<NodeId> {
        self.graph.definition(name)
    }

    /// A validator with default options.
    pub fn validator(&self) -> Validator<'_> {
        Validator::new(&self.graph)
    }

    /// A validator with explicit options.
    pub fn validator_with(&self, options: ValidatorOptions) -> Validator<'_> {
        Validator::with_options(&self.graph, options)
    }

    /// Validate `instance` against the document root.
    ///
    /// # Errors
    ///
    /// Returns the structured [`ValidationError`] on failure.
    pub fn validate(&self, instance: &Value) -> Result<(), ValidationError> {
        self.validator().validate(self.graph.root(), instance)
    }

    /// Validate `instance` against a named definition. An unknown name is
    /// reported as a validation failure against that name.
    ///
    /// # Errors
    ///
    /// Returns the structured [`ValidationError`] on failure.
    pub fn validate_definition(&self, name: &str, instance: &Value) -> Result<(), ValidationError> {
        match self.graph.definition(name) {
            Some(id) => self.validator().validate(id, instance),
            None => Err(ValidationError::unknown_schema(name)),
        }
    }
}

/// A named schema family with a lazily loaded root document.
#[derive(Debug)]
pub struct SchemaFamily {
    name: Cow<'static, str>,
    source: SchemaSource,
    root: OnceLock<Result<Arc<RootSchema>, SchemaLoadError>>,
    loads: AtomicUsize,
}

impl SchemaFamily {
    /// A family backed by a document compiled into the binary. Usable in a
    /// `static`.
    pub const fn embedded(name: &'static str, text: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            source: SchemaSource::Embedded { name, text },
            root: OnceLock::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// A family backed by a JSON or YAML file read on first use.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_source(name, SchemaSource::File(path.into()))
    }

    /// A family backed by an already-parsed document.
    pub fn from_value(name: impl Into<String>, document: Value) -> Self {
        Self::with_source(name, SchemaSource::Value(document))
    }

    /// A family with an explicit source.
    pub fn with_source(name: impl Into<String>, source: SchemaSource) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            source,
            root: OnceLock::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Family name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the document comes from.
    pub fn source(&self) -> &SchemaSource {
        &self.source
    }

    /// The root schema, loading and compiling it on first call.
    ///
    /// # Errors
    ///
    /// Returns the (cached) `SchemaLoadError` if the document is missing,
    /// unparsable, or not a valid schema.
    pub fn root(&self) -> Result<Arc<RootSchema>, SchemaLoadError> {
        self.root
            .get_or_init(|| {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let result = self
                    .source
                    .load(&self.name)
                    .and_then(|doc| RootSchema::new(self.name.to_string(), doc))
                    .map(Arc::new);
                match &result {
                    Ok(root) => tracing::debug!(
                        family = %self.name,
                        location = %self.source.location(),
                        nodes = root.graph().len(),
                        "loaded schema family"
                    ),
                    Err(e) => tracing::error!(family = %self.name, error = %e, "schema family failed to load"),
                }
                result
            })
            .clone()
    }

    /// Whether the root has been loaded (successfully or not).
    pub fn is_loaded(&self) -> bool {
        self.root.get().is_some()
    }

    /// How many times the loader ran; at most one.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TINY: SchemaFamily = SchemaFamily::embedded(
        "tiny",
        r#"{"definitions": {"Align": {"enum": ["left", "center", "right"]}}}"#,
    );

    static BROKEN: SchemaFamily = SchemaFamily::embedded("broken", "{ nope");

    #[test]
    fn test_lazy_single_load() {
        assert_eq!(TINY.name(), "tiny");
        let a = TINY.root().unwrap();
        let b = TINY.root().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(TINY.load_count(), 1);
        assert!(TINY.is_loaded());
    }

    #[test]
    fn test_concurrent_first_use_loads_once() {
        let family = Arc::new(SchemaFamily::from_value(
            "threads",
            json!({"definitions": {"A": {"type": "string"}}}),
        ));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let family = Arc::clone(&family);
                std::thread::spawn(move || family.root().map(|r| r.graph().len()))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(family.load_count(), 1);
    }

    #[test]
    fn test_failure_is_cached() {
        let first = BROKEN.root().unwrap_err();
        let second = BROKEN.root().unwrap_err();
        assert_eq!(first, second);
        assert_eq!(BROKEN.load_count(), 1);
        assert!(matches!(first, SchemaLoadError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_fails_fast() {
        let family = SchemaFamily::from_file("gone", "/nonexistent/vega-lite.json");
        let err = family.root().unwrap_err();
        assert!(matches!(err, SchemaLoadError::NotFound { .. }));
        assert_eq!(err.family(), "gone");
    }

    #[test]
    fn test_validate_definition() {
        let root = TINY.root().unwrap();
        root.validate_definition("Align", &json!("left")).unwrap();
        let err = root.validate_definition("Align", &json!("middle")).unwrap_err();
        assert!(err.to_string().contains("middle"));
        let err = root.validate_definition("Nope", &json!(1)).unwrap_err();
        assert!(err.to_string().contains("Nope"));
    }
}
