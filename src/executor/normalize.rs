//! Schema-aware field normalization
//!
//! The provider's decoded output arrives in whatever shape the model chose:
//! amounts as `"$57,500.00"`, dates in half a dozen formats, enum labels in
//! random casing. These helpers convert each field to its canonical form
//! before constraint validation, so noisy-but-salvageable output and clean
//! output conform to the same value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Accepted date/time formats, tried in order after RFC 3339.
const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
];

/// Accepted date-only formats, tried in order. Date-only values normalize
/// to midnight UTC.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y"];

/// Characters stripped from numeric strings before parsing.
const CURRENCY_SYMBOLS: [char; 4] = ['$', '€', '£', '¥'];

/// Trim incidental whitespace and control characters from a string field.
pub fn normalize_string(raw: &Value) -> Result<String, String> {
    match raw {
        Value::String(s) => Ok(s.chars().filter(|c| !c.is_control()).collect::<String>().trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected a string, got {other}")),
    }
}

/// Convert a numeric field, stripping thousands separators and currency
/// symbols from string inputs: `"57,500.00"` becomes `57500.0`.
pub fn normalize_number(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{n} is not representable as f64")),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',' && *c != '_' && !CURRENCY_SYMBOLS.contains(c))
                .collect();
            if cleaned.is_empty() {
                return Err(format!("'{s}' contains no digits"));
            }
            cleaned
                .parse::<f64>()
                .map_err(|_| format!("'{s}' is not a number"))
        }
        other => Err(format!("expected a number, got {other}")),
    }
}

/// Parse a date/time field against the ordered format lists.
pub fn normalize_date(raw: &Value) -> Result<DateTime<Utc>, String> {
    let Value::String(s) = raw else {
        return Err(format!("expected a date string, got {raw}"));
    };
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let naive = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| format!("'{s}' has no valid midnight"))?;
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(format!("'{s}' matches no accepted date format"))
}

/// Match an enum field case-insensitively against the known labels,
/// returning the canonical label.
pub fn normalize_enum(raw: &Value, labels: &[&'static str]) -> Result<&'static str, String> {
    let Value::String(s) = raw else {
        return Err(format!("expected an enum label, got {raw}"));
    };
    let folded = s.trim().to_lowercase().replace('_', "-");
    labels
        .iter()
        .find(|label| label.to_lowercase().replace('_', "-") == folded)
        .copied()
        .ok_or_else(|| format!("'{s}' is not one of [{}]", labels.join(", ")))
}

/// Normalize a string-list field. A bare string is promoted to a
/// single-element list; list elements are individually trimmed.
pub fn normalize_string_list(raw: &Value) -> Result<Vec<String>, String> {
    match raw {
        Value::Array(items) => items.iter().map(normalize_string).collect(),
        Value::String(_) => Ok(vec![normalize_string(raw)?]),
        other => Err(format!("expected an array of strings, got {other}")),
    }
}

/// Normalize a boolean field; accepts yes/no and true/false strings.
pub fn normalize_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => Ok(true),
            "false" | "no" | "n" => Ok(false),
            other => Err(format!("'{other}' is not a boolean")),
        },
        other => Err(format!("expected a boolean, got {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn thousands_separators_and_currency_stripped() {
        assert_eq!(normalize_number(&json!("57,500.00")).unwrap(), 57_500.0);
        assert_eq!(normalize_number(&json!("$1,234.56")).unwrap(), 1_234.56);
        assert_eq!(normalize_number(&json!("€ 99")).unwrap(), 99.0);
        assert_eq!(normalize_number(&json!(42.5)).unwrap(), 42.5);
    }

    #[test]
    fn garbage_numbers_rejected() {
        assert!(normalize_number(&json!("a lot")).is_err());
        assert!(normalize_number(&json!("$")).is_err());
        assert!(normalize_number(&json!(null)).is_err());
    }

    #[test]
    fn date_formats_tried_in_order() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        for input in ["2024-03-01", "2024/03/01", "03/01/2024", "01.03.2024", "March 1, 2024"] {
            assert_eq!(normalize_date(&json!(input)).unwrap(), expected, "input {input}");
        }
        let with_time = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        assert_eq!(
            normalize_date(&json!("2024-03-01T14:30:00Z")).unwrap(),
            with_time
        );
        assert_eq!(
            normalize_date(&json!("2024-03-01 14:30:00")).unwrap(),
            with_time
        );
    }

    #[test]
    fn enum_labels_match_case_insensitively() {
        let labels: &[&str] = &["manual-review-queue", "automated-processing"];
        assert_eq!(
            normalize_enum(&json!("Manual_Review_Queue"), labels).unwrap(),
            "manual-review-queue"
        );
        assert!(normalize_enum(&json!("elsewhere"), labels).is_err());
    }

    #[test]
    fn strings_lose_control_characters() {
        assert_eq!(
            normalize_string(&json!("  hit\u{0000} and run\t")).unwrap(),
            "hit and run"
        );
    }

    #[test]
    fn bare_string_promotes_to_list() {
        assert_eq!(
            normalize_string_list(&json!("single factor")).unwrap(),
            vec!["single factor".to_string()]
        );
        assert_eq!(
            normalize_string_list(&json!(["a", " b "])).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn loose_booleans_accepted() {
        assert!(normalize_bool(&json!("Yes")).unwrap());
        assert!(!normalize_bool(&json!("no")).unwrap());
        assert!(normalize_bool(&json!(true)).unwrap());
        assert!(normalize_bool(&json!("maybe")).is_err());
    }
}
