//! JSON-Schema gates for Todoist payloads and ritual documents.
//!
//! Both schemas ship embedded in the crate and can be overridden by a path in
//! the configuration. Schemas are loaded fresh for every sync run; nothing is
//! cached process-wide.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::error::ErrorCode;

/// Built-in Todoist payload schema.
pub const TODOIST_SCHEMA: &str = include_str!("../schema/todoist.schema.json");

/// Built-in ritual document schema.
pub const RITUALS_SCHEMA: &str = include_str!("../schema/rituals.schema.json");

/// Maximum number of violations kept in a [`SchemaError::Violation`].
const MAX_REPORTED_VIOLATIONS: usize = 20;

/// Errors raised while loading a schema or validating against one.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema {name} is not valid JSON: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema {name} failed to compile: {message}")]
    Compile { name: String, message: String },

    #[error("schema {name} has no definition `{definition}`")]
    MissingDefinition { name: String, definition: String },

    #[error("{subject} violates schema {name}: {}", violations.join("; "))]
    Violation {
        name: String,
        subject: String,
        violations: Vec<String>,
    },
}

impl SchemaError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Violation { .. } => ErrorCode::SchemaViolation,
            _ => ErrorCode::SchemaLoadFailed,
        }
    }
}

/// A compiled JSON Schema together with its source document.
pub struct Schema {
    name: String,
    raw: Value,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Schema {
    /// Compile a schema from an already-parsed JSON value.
    pub fn from_value(name: impl Into<String>, raw: Value) -> Result<Self, SchemaError> {
        let name = name.into();
        let validator = jsonschema::validator_for(&raw).map_err(|err| SchemaError::Compile {
            name: name.clone(),
            message: err.to_string(),
        })?;
        Ok(Self {
            name,
            raw,
            validator,
        })
    }

    /// Compile a schema from JSON text.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, SchemaError> {
        let name = name.into();
        let raw = serde_json::from_str(text).map_err(|source| SchemaError::Parse {
            name: name.clone(),
            source,
        })?;
        Self::from_value(name, raw)
    }

    /// Load a schema file from disk.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path.display().to_string(), &text)
    }

    /// Load from `path` when given, otherwise compile the embedded `fallback`.
    pub fn load_or_embedded(
        path: Option<&Path>,
        name: &str,
        fallback: &str,
    ) -> Result<Self, SchemaError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::parse(name, fallback),
        }
    }

    /// The Todoist payload schema shipped with the crate.
    pub fn todoist() -> Result<Self, SchemaError> {
        Self::parse("todoist", TODOIST_SCHEMA)
    }

    /// The ritual document schema shipped with the crate.
    pub fn rituals() -> Result<Self, SchemaError> {
        Self::parse("rituals", RITUALS_SCHEMA)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw schema document, for reading annotations such as `prefix`.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// Compile a schema that checks an instance against `definitions/<definition>`.
    ///
    /// The sub-schema keeps the full `definitions` table so internal `$ref`s
    /// still resolve.
    pub fn definition(&self, definition: &str) -> Result<Self, SchemaError> {
        let definitions = self
            .raw
            .get("definitions")
            .filter(|defs| defs.get(definition).is_some())
            .ok_or_else(|| SchemaError::MissingDefinition {
                name: self.name.clone(),
                definition: definition.to_string(),
            })?;

        let mut wrapper = json!({
            "definitions": definitions,
            "allOf": [{ "$ref": format!("#/definitions/{definition}") }],
        });
        if let Some(draft) = self.raw.get("$schema") {
            wrapper["$schema"] = draft.clone();
        }

        Self::from_value(format!("{}#/definitions/{definition}", self.name), wrapper)
    }

    /// Validate `instance`, collecting every violation (capped) into the error.
    pub fn validate(&self, subject: &str, instance: &Value) -> Result<(), SchemaError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(instance)
            .take(MAX_REPORTED_VIOLATIONS)
            .map(|err| {
                let at = err.instance_path.to_string();
                if at.is_empty() {
                    err.to_string()
                } else {
                    format!("{at}: {err}")
                }
            })
            .collect();

        if violations.is_empty() {
            return Ok(());
        }

        tracing::error!(
            schema = %self.name,
            subject,
            violations = violations.len(),
            "schema validation failed"
        );
        Err(SchemaError::Violation {
            name: self.name.clone(),
            subject: subject.to_string(),
            violations,
        })
    }

    /// Read the string `prefix` annotation at a JSON pointer, if present.
    #[must_use]
    pub fn prefix_at(&self, pointer: &str) -> Option<&str> {
        self.raw
            .pointer(pointer)
            .and_then(|node| node.get("prefix"))
            .and_then(Value::as_str)
    }
}
