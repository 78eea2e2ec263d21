//! Declarative output schemas
//!
//! Each analysis task describes the structured object it expects back from
//! the completion service once, as an [`OutputSchema`]. The same value is
//! rendered into the JSON Schema sent with the request and used to check the
//! payload that comes back.

use serde_json::{json, Map, Value};

/// Type constraint of a single schema field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Free-form string
    String,
    /// String restricted to the listed values
    Enum(&'static [&'static str]),
    /// Array of strings
    StringList,
    /// Whole number
    Integer,
    /// Any number, optionally bounded (inclusive)
    Number {
        /// Lower bound
        min: Option<f64>,
        /// Upper bound
        max: Option<f64>,
    },
    /// `true` or `false`
    Boolean,
    /// Array of objects described by nested fields
    ObjectList(Vec<Field>),
}

/// One named field of a schema
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Property name as it appears in the JSON payload
    pub name: &'static str,
    /// Type constraint
    pub ty: FieldType,
    /// Whether the payload must carry this field
    pub required: bool,
}

impl Field {
    /// A required field
    pub fn required(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, required: true }
    }

    /// An optional field
    pub fn optional(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty, required: false }
    }

    fn to_json(&self) -> Value {
        match &self.ty {
            FieldType::String => json!({ "type": "string" }),
            FieldType::Enum(values) => json!({ "type": "string", "enum": values }),
            FieldType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldType::Integer => json!({ "type": "integer" }),
            FieldType::Number { min, max } => {
                let mut schema = json!({ "type": "number" });
                if let Some(min) = min {
                    schema["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    schema["maximum"] = json!(max);
                }
                schema
            }
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::ObjectList(fields) => json!({
                "type": "array",
                "items": object_schema(fields),
            }),
        }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        check_value(self.name, &self.ty, value)
    }
}

/// The structured object one task asks the completion service to return
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    /// Name of the reporting function the model is forced to call
    pub function_name: &'static str,
    /// Description sent alongside the function
    pub description: &'static str,
    /// Field definitions in declaration order
    pub fields: Vec<Field>,
    /// Enum field carrying the task's overall rating
    pub headline: &'static str,
    /// String-list field carrying the task's recommendations
    pub recommendations: &'static str,
}

impl OutputSchema {
    /// Names of all required fields, in declaration order
    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name).collect()
    }

    /// JSON Schema for the function parameters
    pub fn to_json_schema(&self) -> Value {
        object_schema(&self.fields)
    }

    /// Function definition in the chat-completions `tools` format
    pub fn to_tool(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.function_name,
                "description": self.description,
                "parameters": self.to_json_schema(),
            }
        })
    }

    /// Checks a payload against this schema.
    ///
    /// Every required field must be present and non-null, and every declared
    /// field that is present must have the declared type. Undeclared fields
    /// are kept as-is.
    pub fn validate(&self, payload: Value) -> Result<Map<String, Value>, String> {
        let Value::Object(map) = payload else {
            return Err(format!("expected a JSON object, got {}", type_name(&payload)));
        };

        for field in &self.fields {
            match map.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(format!("missing required field `{}`", field.name));
                }
                None | Some(Value::Null) => {}
                Some(value) => field.check(value)?,
            }
        }

        Ok(map)
    }
}

fn object_schema(fields: &[Field]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|f| (f.name.to_string(), f.to_json()))
        .collect();
    let required: Vec<&str> = fields.iter().filter(|f| f.required).map(|f| f.name).collect();

    let mut schema = json!({ "type": "object", "properties": properties });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn check_value(name: &str, ty: &FieldType, value: &Value) -> Result<(), String> {
    let mismatch = |expected: &str| {
        Err(format!(
            "field `{}` should be {}, got {}",
            name,
            expected,
            type_name(value)
        ))
    };

    match ty {
        FieldType::String => match value {
            Value::String(_) => Ok(()),
            _ => mismatch("a string"),
        },
        FieldType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            Some(s) => Err(format!(
                "field `{}` has value `{}`, expected one of {}",
                name,
                s,
                allowed.join(", ")
            )),
            None => mismatch("a string"),
        },
        FieldType::StringList => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(()),
            _ => mismatch("an array of strings"),
        },
        FieldType::Integer => {
            if value.is_i64() || value.is_u64() {
                Ok(())
            } else {
                mismatch("an integer")
            }
        }
        FieldType::Number { min, max } => {
            let Some(n) = value.as_f64() else {
                return mismatch("a number");
            };
            if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                return Err(format!("field `{}` is out of range: {}", name, n));
            }
            Ok(())
        }
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => mismatch("a boolean"),
        },
        FieldType::ObjectList(fields) => {
            let Value::Array(items) = value else {
                return mismatch("an array of objects");
            };
            for item in items {
                let Value::Object(obj) = item else {
                    return mismatch("an array of objects");
                };
                for field in fields {
                    match obj.get(field.name) {
                        None | Some(Value::Null) if field.required => {
                            return Err(format!(
                                "missing required field `{}` in `{}`",
                                field.name, name
                            ));
                        }
                        None | Some(Value::Null) => {}
                        Some(v) => field.check(v)?,
                    }
                }
            }
            Ok(())
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
