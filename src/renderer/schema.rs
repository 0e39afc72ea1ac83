//! Input validation against template schemas.
//!
//! A template declares the fields its data must carry. Validation reports
//! every violation at once, each naming the offending field.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::registry::TemplateDescriptor;
use super::template::resolve_path;
use super::SchemaValidator;
use crate::error::GenerationError;

/// JSON type a field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl FieldKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Array => value.is_array(),
            FieldKind::Object => value.is_object(),
            FieldKind::Any => true,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
            FieldKind::Any => "any",
        }
    }
}

/// One declared field (dotted path into the input data)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Validation error for a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)
    }
}

/// Collection of validation errors
#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Ok if nothing was reported, otherwise one `Validation` error listing all
    pub fn into_result(self) -> Result<(), GenerationError> {
        if self.is_empty() {
            return Ok(());
        }
        let details: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        Err(GenerationError::Validation(format!(
            "{} error(s): {}",
            self.errors.len(),
            details.join("; ")
        )))
    }
}

/// Check `data` against a list of field rules
pub fn check_fields(rules: &[FieldRule], data: &Value) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    if rules.is_empty() {
        return errors;
    }

    if !data.is_object() {
        errors.add(ValidationError::new("$", "data must be a JSON object"));
        return errors;
    }

    for rule in rules {
        match resolve_path(data, &rule.name) {
            None | Some(Value::Null) => {
                if rule.required {
                    errors.add(ValidationError::new(&rule.name, "is required"));
                }
            }
            Some(value) => {
                if !rule.kind.accepts(value) {
                    errors.add(ValidationError::new(
                        &rule.name,
                        format!("must be of type {}", rule.kind.as_str()),
                    ));
                } else if rule.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                    errors.add(ValidationError::new(&rule.name, "cannot be empty"));
                }
            }
        }
    }

    errors
}

/// Validates input data against the schema declared on the template
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateSchemaValidator;

impl TemplateSchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaValidator for TemplateSchemaValidator {
    fn validate(&self, template: &TemplateDescriptor, data: &Value) -> Result<(), GenerationError> {
        check_fields(&template.schema, data).into_result()
    }
}
