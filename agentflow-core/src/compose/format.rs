//! Parse/serialize for the two manifest formats (YAML and JSON).
//!
//! Both formats deserialize into the same ordered value tree, so the rest of
//! the pipeline treats them as interchangeable. `dump` is the inverse of
//! `load` for the unexpanded form: the version/kind/metadata keys are always
//! emitted first, everything else in stable insertion order.

use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::ComposeError;

/// Top-level keys `dump` always emits first, in this order.
pub const LEADING_KEYS: [&str; 3] = ["version", "kind", "metadata"];

/// On-disk manifest format, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Yaml,
    Json,
}

impl DocFormat {
    /// `.json` means JSON; `.yaml`/`.yml` and anything else means YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => DocFormat::Json,
            _ => DocFormat::Yaml,
        }
    }

    /// Parse file contents into the shared value tree.
    pub fn parse(&self, text: &str, path: &Path) -> Result<Value, ComposeError> {
        match self {
            DocFormat::Yaml => {
                serde_yaml::from_str(text).map_err(|e| ComposeError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
            DocFormat::Json => {
                let json: serde_json::Value =
                    serde_json::from_str(text).map_err(|e| ComposeError::Parse {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                serde_yaml::to_value(&json).map_err(|e| ComposeError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Serialize a value tree in this format.
    pub fn serialize(&self, value: &Value) -> Result<String, ComposeError> {
        match self {
            DocFormat::Yaml => serde_yaml::to_string(value).map_err(|e| ComposeError::Serialize {
                message: e.to_string(),
            }),
            DocFormat::Json => {
                let json =
                    serde_json::to_value(value).map_err(|e| ComposeError::Serialize {
                        message: e.to_string(),
                    })?;
                serde_json::to_string_pretty(&json).map_err(|e| ComposeError::Serialize {
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Reorder a root mapping so the leading keys come first; all other keys keep
/// their insertion order. Non-mapping roots pass through unchanged.
pub fn reorder_root(value: &Value) -> Value {
    let Value::Mapping(mapping) = value else {
        return value.clone();
    };
    let mut out = Mapping::new();
    for key in LEADING_KEYS {
        let key = Value::String(key.to_string());
        if let Some(v) = mapping.get(&key) {
            out.insert(key, v.clone());
        }
    }
    for (k, v) in mapping {
        let leading = matches!(k, Value::String(s) if LEADING_KEYS.contains(&s.as_str()));
        if !leading {
            out.insert(k.clone(), v.clone());
        }
    }
    Value::Mapping(out)
}
