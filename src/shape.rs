//! Structured response shapes for the two completion tasks.
//!
//! Each shape pairs a Rust record with the JSON schema sent to the backend.
//! The backend is asked to honor the schema in strict mode, and the decoded
//! record is checked again locally so that an out-of-schema answer surfaces as
//! a schema violation instead of reaching the display state.
use crate::catalog::Catalog;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// A record shape a structured completion can be constrained to.
pub trait ResponseShape {
    type Output: DeserializeOwned + Send;

    /// Schema name reported to the backend (`[a-zA-Z0-9_-]+`).
    fn name(&self) -> &str;

    /// JSON schema describing `Output`, built when the shape is constructed.
    fn schema(&self) -> &Value;

    /// Reject decoded values that parse but still break the schema.
    fn check(&self, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }
}

/// Rewrite of a sentence under one grammar rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationResult {
    pub original_sentence: String,
    pub timeless_sentence: String,
}

/// Grammar rules that apply to a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarClassification {
    pub original_sentence: String,
    pub applicable_grammars: Vec<String>,
}

/// Shape for the rewrite task.
#[derive(Debug, Clone)]
pub struct TranslationShape {
    schema: Value,
}

impl TranslationShape {
    pub fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {
                    "original_sentence": { "type": "string" },
                    "timeless_sentence": { "type": "string" }
                },
                "required": ["original_sentence", "timeless_sentence"],
                "additionalProperties": false
            }),
        }
    }
}

impl Default for TranslationShape {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseShape for TranslationShape {
    type Output = TranslationResult;

    fn name(&self) -> &str {
        "translation"
    }

    fn schema(&self) -> &Value {
        &self.schema
    }
}

/// Shape for the classification task, closed over the catalog's rule names.
///
/// Built once from the catalog at startup; the enumeration never changes for
/// the lifetime of the shape.
#[derive(Debug, Clone)]
pub struct ClassificationShape {
    allowed: BTreeSet<String>,
    schema: Value,
}

impl ClassificationShape {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let allowed: BTreeSet<String> = catalog.names().map(str::to_string).collect();
        let schema = json!({
            "type": "object",
            "properties": {
                "original_sentence": {
                    "type": "string",
                    "description": "The original sentence provided for grammar application."
                },
                "applicable_grammars": {
                    "type": "array",
                    "description": "List of grammars applied for the given sentence.",
                    "items": { "type": "string", "enum": allowed }
                }
            },
            "required": ["original_sentence", "applicable_grammars"],
            "additionalProperties": false
        });
        Self { allowed, schema }
    }
}

impl ResponseShape for ClassificationShape {
    type Output = GrammarClassification;

    fn name(&self) -> &str {
        "sentence_grammar"
    }

    fn schema(&self) -> &Value {
        &self.schema
    }

    fn check(&self, output: &GrammarClassification) -> Result<(), String> {
        let unknown: Vec<&str> = output
            .applicable_grammars
            .iter()
            .map(String::as_str)
            .filter(|name| !self.allowed.contains(*name))
            .collect();
        if unknown.is_empty() {
            return Ok(());
        }
        Err(format!(
            "applicable_grammars contains values outside the catalog: {}",
            unknown.join(", ")
        ))
    }
}
