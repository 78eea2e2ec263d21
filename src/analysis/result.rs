use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::schema::OutputSchema;
use super::task::AnalysisKind;

/// Validated output of one analysis task.
///
/// Only constructed through [`AnalysisResult::from_payload`], so every
/// required field of the task's schema is present and well-typed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    kind: AnalysisKind,
    headline_field: &'static str,
    recommendations_field: &'static str,
    fields: Map<String, Value>,
}

impl AnalysisResult {
    /// Validates a raw payload against a schema
    pub fn from_payload(
        kind: AnalysisKind,
        schema: &OutputSchema,
        payload: Value,
    ) -> Result<Self, String> {
        let fields = schema.validate(payload)?;
        Ok(Self {
            kind,
            headline_field: schema.headline,
            recommendations_field: schema.recommendations,
            fields,
        })
    }

    /// The task that produced this result
    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    /// Value of one field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// The task's overall rating, e.g. `"Fair"` or `"High"`
    pub fn headline(&self) -> Option<&str> {
        self.fields.get(self.headline_field).and_then(Value::as_str)
    }

    /// The task's recommendations in the order the model gave them
    pub fn recommendations(&self) -> Vec<&str> {
        self.fields
            .get(self.recommendations_field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}
