//! Declarative output schemas
//!
//! Each stage declares the shape it expects back from the provider as an
//! [`OutputSchema`]: field names, kinds, and constraints. The executor
//! consumes the schema generically for normalization, validation, and for
//! rendering the stricter retry instruction. Adding a new stage means
//! declaring a schema, not writing new parsing code.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::normalize;

/// Field kind plus its validation constraints.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Free text, trimmed of incidental whitespace/control characters.
    String,
    /// Numeric value; string inputs lose currency symbols and thousands
    /// separators before conversion.
    Number { min: Option<f64>, max: Option<f64> },
    /// Date/time parsed against an ordered list of accepted formats.
    Date {
        /// Reject timestamps later than processing time.
        not_future: bool,
    },
    /// One of a fixed label set, matched case-insensitively. The canonical
    /// label is substituted into the normalized output.
    Enum { labels: &'static [&'static str] },
    /// Ordered list of strings.
    StringList,
    /// Boolean; accepts `true`/`false`, `"yes"`/`"no"` strings.
    Bool,
}

/// One expected output field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    /// Human-readable shape hint used in prompt instructions.
    fn shape_hint(&self) -> String {
        let kind = match &self.kind {
            FieldKind::String => "string".to_string(),
            FieldKind::Number { min, max } => match (min, max) {
                (Some(min), Some(max)) => format!("number between {min} and {max}"),
                (Some(min), None) => format!("number >= {min}"),
                (None, Some(max)) => format!("number <= {max}"),
                (None, None) => "number".to_string(),
            },
            FieldKind::Date { .. } => "ISO 8601 date".to_string(),
            FieldKind::Enum { labels } => format!("one of: {}", labels.join(" | ")),
            FieldKind::StringList => "array of strings".to_string(),
            FieldKind::Bool => "true or false".to_string(),
        };
        format!("\"{}\": {}", self.name, kind)
    }
}

/// A single constraint or shape violation found while conforming a value.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Expected structured output for one stage call.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Schema name for logging (e.g. "claim_facts").
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl OutputSchema {
    pub fn new(name: &'static str, fields: Vec<FieldSpec>) -> Self {
        Self { name, fields }
    }

    /// Field names, for the partial-extraction decode layer.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.name).collect()
    }

    /// Render the baseline output instructions appended to every prompt.
    pub fn render_instructions(&self) -> String {
        let mut out = String::from("Respond with a JSON object containing:\n");
        for field in &self.fields {
            out.push_str("  ");
            out.push_str(&field.shape_hint());
            if !field.required {
                out.push_str(" (optional)");
            }
            out.push('\n');
        }
        out
    }

    /// Render the stricter instruction used on retry attempts.
    pub fn render_strict_instructions(&self) -> String {
        format!(
            "IMPORTANT: Output ONLY a single JSON object and nothing else. \
             No prose, no markdown fences, no comments.\n{}",
            self.render_instructions()
        )
    }

    /// Normalize then validate a decoded value against this schema.
    ///
    /// Applied regardless of which decode layer produced the value: numbers
    /// lose separators/currency symbols, dates are parsed against the
    /// accepted format list, enum labels match case-insensitively, strings
    /// are trimmed. Returns the normalized object or every violation found.
    pub fn conform(&self, value: &Value, now: DateTime<Utc>) -> Result<Value, Vec<SchemaViolation>> {
        let Some(object) = value.as_object() else {
            return Err(vec![SchemaViolation {
                field: "<root>".to_string(),
                message: format!("expected a JSON object, got {}", value_kind(value)),
            }]);
        };

        let mut normalized = serde_json::Map::new();
        let mut violations = Vec::new();

        for field in &self.fields {
            let raw = object.get(field.name).filter(|v| !v.is_null());
            let Some(raw) = raw else {
                if field.required {
                    violations.push(SchemaViolation {
                        field: field.name.to_string(),
                        message: "required field missing".to_string(),
                    });
                }
                continue;
            };

            match conform_field(field, raw, now) {
                Ok(value) => {
                    normalized.insert(field.name.to_string(), value);
                }
                Err(message) => violations.push(SchemaViolation {
                    field: field.name.to_string(),
                    message,
                }),
            }
        }

        if violations.is_empty() {
            Ok(Value::Object(normalized))
        } else {
            Err(violations)
        }
    }
}

fn conform_field(field: &FieldSpec, raw: &Value, now: DateTime<Utc>) -> Result<Value, String> {
    match &field.kind {
        FieldKind::String => normalize::normalize_string(raw).map(Value::String),
        FieldKind::Number { min, max } => {
            let n = normalize::normalize_number(raw)?;
            if let Some(min) = min {
                if n < *min {
                    return Err(format!("{n} is below minimum {min}"));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(format!("{n} is above maximum {max}"));
                }
            }
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| format!("{n} is not a representable number"))
        }
        FieldKind::Date { not_future } => {
            let dt = normalize::normalize_date(raw)?;
            if *not_future && dt > now {
                return Err(format!("{dt} is in the future"));
            }
            Ok(Value::String(dt.to_rfc3339()))
        }
        FieldKind::Enum { labels } => {
            let label = normalize::normalize_enum(raw, labels)?;
            Ok(Value::String(label.to_string()))
        }
        FieldKind::StringList => {
            let items = normalize::normalize_string_list(raw)?;
            Ok(Value::Array(items.into_iter().map(Value::String).collect()))
        }
        FieldKind::Bool => normalize::normalize_bool(raw).map(Value::Bool),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> OutputSchema {
        OutputSchema::new(
            "test",
            vec![
                FieldSpec::required("amount", FieldKind::Number { min: Some(0.0), max: None }),
                FieldSpec::required("when", FieldKind::Date { not_future: true }),
                FieldSpec::required(
                    "category",
                    FieldKind::Enum {
                        labels: &["auto", "home"],
                    },
                ),
                FieldSpec::optional("notes", FieldKind::String),
            ],
        )
    }

    #[test]
    fn conform_normalizes_currency_and_labels() {
        let value = json!({
            "amount": "$57,500.00",
            "when": "2024-03-01",
            "category": "AUTO",
            "notes": "  trimmed  ",
        });
        let out = schema().conform(&value, Utc::now()).unwrap();
        assert_eq!(out["amount"], json!(57500.0));
        assert_eq!(out["category"], json!("auto"));
        assert_eq!(out["notes"], json!("trimmed"));
    }

    #[test]
    fn negative_amount_is_a_violation() {
        let value = json!({
            "amount": -100,
            "when": "2024-03-01",
            "category": "auto",
        });
        let violations = schema().conform(&value, Utc::now()).unwrap_err();
        assert!(violations.iter().any(|v| v.field == "amount"));
    }

    #[test]
    fn future_date_is_a_violation() {
        let tomorrow = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
        let value = json!({
            "amount": 10,
            "when": tomorrow,
            "category": "auto",
        });
        let violations = schema().conform(&value, Utc::now()).unwrap_err();
        assert!(violations.iter().any(|v| v.field == "when"));
    }

    #[test]
    fn missing_required_field_reported() {
        let value = json!({"amount": 10, "category": "auto"});
        let violations = schema().conform(&value, Utc::now()).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "when");
    }

    #[test]
    fn non_object_root_rejected() {
        let violations = schema().conform(&json!([1, 2]), Utc::now()).unwrap_err();
        assert_eq!(violations[0].field, "<root>");
    }
}
