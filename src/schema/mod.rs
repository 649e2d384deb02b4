//! Per-section validation schemas.
//!
//! Validation is two-level. Shape checks gate every commit: a value with a
//! wrong type, an unknown field, or a constraint violation never reaches the
//! store. Completeness asks the separate question of whether every required
//! field is filled in — a draft may commit a shape-valid but half-filled
//! section, which is what lets field crews save partial work per section
//! while the whole document is still not submittable.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod registry;

/// Validation schema for one section's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSchema {
    pub fields: Vec<FieldSchema>,
}

/// One field within a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub kind: FieldKind,
}

/// Typed constraint for a field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text {
        #[serde(default)]
        min_len: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default)]
        integer: bool,
    },
    Boolean,
    Choice {
        options: Vec<String>,
    },
    List {
        item: Box<FieldKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
}

/// A single field-level violation, surfaced inline by section editors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A section value failed shape validation; nothing was committed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("section '{section}': {} field violation(s)", violations.len())]
pub struct ValidationError {
    pub section: String,
    pub violations: Vec<FieldViolation>,
}

impl SectionSchema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Shape-check a candidate section value.
    ///
    /// The value must be a JSON object; every present field must be declared
    /// and must satisfy its kind. Null fields count as not-filled-in and are
    /// skipped. An empty object is valid.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<FieldViolation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![FieldViolation::new(
                "",
                "section value must be an object",
            )]);
        };

        let mut violations = Vec::new();
        for (name, field_value) in object {
            let Some(field) = self.field(name) else {
                violations.push(FieldViolation::new(
                    name.clone(),
                    format!("unknown field '{name}'"),
                ));
                continue;
            };
            if field_value.is_null() {
                continue;
            }
            check_kind(&field.kind, name, field_value, &mut violations);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// True when every required field is present and filled in.
    ///
    /// Null and blank-string values do not count as filled.
    pub fn is_complete(&self, value: &Value) -> bool {
        let Some(object) = value.as_object() else {
            return false;
        };
        self.fields
            .iter()
            .filter(|f| f.required)
            .all(|f| object.get(&f.name).is_some_and(filled))
    }
}

fn filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn check_kind(kind: &FieldKind, field: &str, value: &Value, out: &mut Vec<FieldViolation>) {
    match kind {
        FieldKind::Text {
            min_len,
            max_len,
            pattern,
        } => {
            let Some(text) = value.as_str() else {
                out.push(FieldViolation::new(field, "expected text"));
                return;
            };
            let len = text.chars().count();
            if len < *min_len {
                out.push(FieldViolation::new(
                    field,
                    format!("must be at least {min_len} character(s)"),
                ));
            }
            if let Some(max) = max_len {
                if len > *max {
                    out.push(FieldViolation::new(
                        field,
                        format!("must be at most {max} character(s)"),
                    ));
                }
            }
            if let Some(pattern) = pattern {
                match Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(text) {
                            out.push(FieldViolation::new(field, "does not match expected format"));
                        }
                    }
                    Err(e) => {
                        // Schema-author error, not user error; reject rather
                        // than silently accept unvalidated input.
                        tracing::warn!(field, error = %e, "invalid pattern in section schema");
                        out.push(FieldViolation::new(field, "field has an invalid format rule"));
                    }
                }
            }
        }
        FieldKind::Number { min, max, integer } => {
            let Some(number) = value.as_f64() else {
                out.push(FieldViolation::new(field, "expected a number"));
                return;
            };
            if *integer && number.fract() != 0.0 {
                out.push(FieldViolation::new(field, "expected a whole number"));
            }
            if let Some(min) = min {
                if number < *min {
                    out.push(FieldViolation::new(field, format!("must be at least {min}")));
                }
            }
            if let Some(max) = max {
                if number > *max {
                    out.push(FieldViolation::new(field, format!("must be at most {max}")));
                }
            }
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                out.push(FieldViolation::new(field, "expected true or false"));
            }
        }
        FieldKind::Choice { options } => {
            let Some(choice) = value.as_str() else {
                out.push(FieldViolation::new(field, "expected one of the listed options"));
                return;
            };
            if !options.iter().any(|o| o == choice) {
                out.push(FieldViolation::new(
                    field,
                    format!("'{choice}' is not one of the listed options"),
                ));
            }
        }
        FieldKind::List { item, max_items } => {
            let Some(items) = value.as_array() else {
                out.push(FieldViolation::new(field, "expected a list"));
                return;
            };
            if let Some(max) = max_items {
                if items.len() > *max {
                    out.push(FieldViolation::new(
                        field,
                        format!("must have at most {max} item(s)"),
                    ));
                }
            }
            for (index, entry) in items.iter().enumerate() {
                check_kind(item, &format!("{field}[{index}]"), entry, out);
            }
        }
    }
}
