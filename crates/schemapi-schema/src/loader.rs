//! # Schema Sources
//!
//! Where a root schema document comes from and how its text becomes a
//! `serde_json::Value`. Packaged documents are embedded with `include_str!`;
//! documents on disk are read on first use. Files ending in `.yaml`/`.yml`
//! are parsed as YAML and converted to the equivalent JSON value tree.

use std::path::{Path, PathBuf};

use schemapi_core::SchemaLoadError;
use serde_json::Value;

/// The origin of a root schema document.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// A document compiled into the binary, typically via `include_str!`.
    Embedded {
        /// Resource name used in diagnostics.
        name: &'static str,
        /// JSON text of the document.
        text: &'static str,
    },
    /// A JSON or YAML document on disk.
    File(PathBuf),
    /// An already-parsed document.
    Value(Value),
}

/// Text format of a schema document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// JSON text.
    Json,
    /// YAML text (JSON-compatible subset).
    Yaml,
}

impl SourceFormat {
    /// Pick the format from a file extension; anything but `yaml`/`yml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

impl SchemaSource {
    /// Human-readable location for diagnostics.
    pub fn location(&self) -> String {
        match self {
            Self::Embedded { name, .. } => format!("<embedded:{name}>"),
            Self::File(path) => path.display().to_string(),
            Self::Value(_) => "<value>".to_string(),
        }
    }

    /// Read and parse the document.
    ///
    /// # Errors
    ///
    /// Returns `SchemaLoadError::NotFound` if a file cannot be read and
    /// `SchemaLoadError::Parse` if the text is not valid JSON/YAML.
    pub fn load(&self, family: &str) -> Result<Value, SchemaLoadError> {
        match self {
            Self::Embedded { text, .. } => parse_text(family, text, SourceFormat::Json),
            Self::File(path) => {
                let text =
                    std::fs::read_to_string(path).map_err(|e| SchemaLoadError::NotFound {
                        family: family.to_string(),
                        location: path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                parse_text(family, &text, SourceFormat::from_path(path))
            }
            Self::Value(value) => Ok(value.clone()),
        }
    }
}

/// Parse schema text in the given format.
///
/// # Errors
///
/// Returns `SchemaLoadError::Parse` on malformed input.
pub fn parse_text(family: &str, text: &str, format: SourceFormat) -> Result<Value, SchemaLoadError> {
    let parse_err = |reason: String| SchemaLoadError::Parse {
        family: family.to_string(),
        reason,
    };
    match format {
        SourceFormat::Json => {
            serde_json::from_str(text).map_err(|e| parse_err(format!("invalid JSON: {e}")))
        }
        SourceFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| parse_err(format!("invalid YAML: {e}")))?;
            yaml_to_json_value(&yaml)
                .map_err(|e| parse_err(format!("YAML-to-JSON conversion failed: {e}")))
        }
    }
}

/// Convert a `serde_yaml::Value` to a `serde_json::Value`.
///
/// Tags are dropped, scalar map keys are stringified, and floats that JSON
/// cannot represent are rejected.
pub fn yaml_to_json_value(yaml: &serde_yaml::Value) -> Result<Value, String> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Number(serde_json::Number::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::Number(serde_json::Number::from(u)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| format!("cannot represent float {f} in JSON"))
            } else {
                Err(format!("unsupported YAML number: {n:?}"))
            }
        }
        serde_yaml::Value::String(s) => Ok(Value::String(s.clone())),
        serde_yaml::Value::Sequence(seq) => seq
            .iter()
            .map(yaml_to_json_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s.clone(),
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported YAML map key: {other:?}")),
                };
                out.insert(key, yaml_to_json_value(v)?);
            }
            Ok(Value::Object(out))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json_value(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_json() {
        let source = SchemaSource::Embedded {
            name: "tiny",
            text: r#"{"definitions": {"A": {"type": "string"}}}"#,
        };
        let doc = source.load("tiny").unwrap();
        assert_eq!(doc["definitions"]["A"]["type"], "string");
        assert_eq!(source.location(), "<embedded:tiny>");
    }

    #[test]
    fn test_embedded_invalid_json() {
        let source = SchemaSource::Embedded {
            name: "broken",
            text: "{ not json",
        };
        let err = source.load("broken").unwrap_err();
        assert!(matches!(err, SchemaLoadError::Parse { .. }));
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let source = SchemaSource::File(PathBuf::from("/nonexistent/schema.json"));
        let err = source.load("missing").unwrap_err();
        match err {
            SchemaLoadError::NotFound { location, .. } => {
                assert!(location.contains("schema.json"))
            }
            other => panic!("Expected NotFound, got: {other}"),
        }
    }

    #[test]
    fn test_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "definitions:\n  Align:\n    enum: [left, center, right]\n  Count:\n    type: integer\n    minimum: 0"
        )
        .unwrap();
        let doc = SchemaSource::File(path).load("yaml").unwrap();
        assert_eq!(doc["definitions"]["Align"]["enum"][1], "center");
        assert_eq!(doc["definitions"]["Count"]["minimum"], 0);
    }

    #[test]
    fn test_yaml_non_string_keys_are_stringified() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("1: one\ntrue: yes").unwrap();
        let json = yaml_to_json_value(&yaml).unwrap();
        assert_eq!(json["1"], "one");
        assert_eq!(json["true"], "yes");
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(SourceFormat::from_path(Path::new("a.yml")), SourceFormat::Yaml);
        assert_eq!(SourceFormat::from_path(Path::new("a.json")), SourceFormat::Json);
        assert_eq!(SourceFormat::from_path(Path::new("a")), SourceFormat::Json);
    }
}
