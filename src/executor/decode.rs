//! Layered decoding of provider output
//!
//! Providers return free-form text that is supposed to contain a JSON
//! object but routinely arrives wrapped in prose, fenced in markdown,
//! decorated with comments, truncated mid-string, or quoted with the wrong
//! quote character. The layers here are tried in order until one yields a
//! syntactically valid object:
//!
//! 1. strict parse of the whole response
//! 2. extraction of the first balanced `{...}` block from surrounding prose
//! 3. cleanup (fences, comments, trailing commas, control chars), then 1-2
//! 4. heuristic repair of truncation and quoting defects
//! 5. best-effort per-field extraction against the schema's field names
//!
//! The decoded value is syntax only; schema conformance happens afterwards
//! and is identical no matter which layer succeeded.

use serde_json::{Map, Value};
use tracing::trace;

/// Which decode layer produced the value (logged for observability).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeLayer {
    Strict,
    Extracted,
    Cleaned,
    Repaired,
    Partial,
}

impl std::fmt::Display for DecodeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Extracted => "extracted",
            Self::Cleaned => "cleaned",
            Self::Repaired => "repaired",
            Self::Partial => "partial",
        };
        f.write_str(s)
    }
}

/// All decode layers failed to produce a structured value.
#[derive(Debug, thiserror::Error)]
#[error("no decode layer produced a structured value from {response_len} chars")]
pub struct DecodeError {
    pub response_len: usize,
}

/// Run the layered decode pipeline.
///
/// `field_names` feeds the final partial-extraction layer; it comes from
/// the stage's output schema.
pub fn decode(raw: &str, field_names: &[&str]) -> Result<(Value, DecodeLayer), DecodeError> {
    let trimmed = raw.trim();

    if let Some(value) = parse_object(trimmed) {
        return Ok((value, DecodeLayer::Strict));
    }

    if let Some(block) = first_balanced_block(trimmed) {
        if let Some(value) = parse_object(&block) {
            return Ok((value, DecodeLayer::Extracted));
        }
    }

    let cleaned = cleanup(trimmed);
    if let Some(value) = parse_object(&cleaned) {
        return Ok((value, DecodeLayer::Cleaned));
    }
    if let Some(block) = first_balanced_block(&cleaned) {
        if let Some(value) = parse_object(&block) {
            return Ok((value, DecodeLayer::Cleaned));
        }
    }

    if let Some(repaired) = repair(&cleaned) {
        if let Some(value) = parse_object(&repaired) {
            return Ok((value, DecodeLayer::Repaired));
        }
    }

    if let Some(value) = partial_extract(&cleaned, field_names) {
        trace!(fields = value.as_object().map_or(0, Map::len), "partial extraction salvaged fields");
        return Ok((value, DecodeLayer::Partial));
    }

    Err(DecodeError {
        response_len: raw.len(),
    })
}

/// Strict parse; only accepts a top-level object.
fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Find the first balanced `{...}` block, respecting string literals.
fn first_balanced_block(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip markdown fences, comments, control characters, and trailing
/// separators, touching only text outside string literals.
fn cleanup(text: &str) -> String {
    // Fences first: they never appear inside the JSON payload itself.
    let defenced: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = String::with_capacity(defenced.len());
    let mut chars = defenced.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'/') => {
                // Line comment: drop to end of line.
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            c if c.is_control() && c != '\n' && c != '\t' => {}
            _ => out.push(ch),
        }
    }

    strip_trailing_commas(&out)
}

/// Remove `,` immediately preceding a closing brace/bracket (outside strings).
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '}' | ']' => {
                // Drop any comma (and whitespace) dangling before the closer.
                while matches!(out.chars().last(), Some(c) if c.is_whitespace()) {
                    out.pop();
                }
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Heuristic repair of common truncation and quoting defects:
/// single-quoted keys/values, an unterminated final string, and missing
/// closing brackets.
fn repair(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut candidate: String = text[start..].to_string();

    // Swap single-quote delimiters for double quotes when the text clearly
    // prefers them (more single than double quotes).
    let singles = candidate.matches('\'').count();
    let doubles = candidate.matches('"').count();
    if singles > doubles && singles >= 2 {
        candidate = candidate.replace('\'', "\"");
    }

    // Walk the candidate tracking bracket nesting and string state.
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in candidate.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    // Close an unterminated trailing string, drop a dangling comma, then
    // close whatever brackets remain open.
    if in_string {
        candidate.push('"');
    }
    let trimmed_len = candidate.trim_end().len();
    candidate.truncate(trimmed_len);
    if candidate.ends_with(',') || candidate.ends_with(':') {
        candidate.pop();
    }
    while let Some(closer) = stack.pop() {
        candidate.push(closer);
    }

    Some(strip_trailing_commas(&candidate))
}

/// Last resort: scrape individual `"field": value` pairs by name.
///
/// Returns an object containing whichever schema fields could be found, or
/// `None` if nothing was salvageable.
fn partial_extract(text: &str, field_names: &[&str]) -> Option<Value> {
    let mut object = Map::new();

    for name in field_names {
        let pattern = format!(
            r#""?{}"?\s*[:=]\s*("(?:[^"\\]|\\.)*"|\[[^\]]*\]|[^,}}\n]+)"#,
            regex::escape(name)
        );
        let Ok(re) = regex::Regex::new(&pattern) else {
            continue;
        };
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let raw = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if raw.is_empty() {
            continue;
        }

        // Prefer a real JSON parse of the fragment; next a leading numeric
        // token ("0.65 overall" → 0.65); last resort, the raw string.
        let value = serde_json::from_str::<Value>(raw).ok().or_else(|| {
            raw.split_whitespace()
                .next()
                .and_then(|tok| tok.parse::<f64>().ok())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        });
        let value = value.unwrap_or_else(|| Value::String(raw.trim_matches('"').to_string()));
        object.insert((*name).to_string(), value);
    }

    if object.is_empty() {
        None
    } else {
        Some(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[&str] = &["score", "factors", "confidence"];

    #[test]
    fn strict_layer_handles_clean_json() {
        let (value, layer) = decode(r#"{"score": 0.5}"#, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Strict);
        assert_eq!(value["score"], json!(0.5));
    }

    #[test]
    fn extraction_layer_handles_surrounding_prose() {
        let raw = r#"Sure! Here is the assessment you asked for:
{"score": 0.7, "confidence": 0.9}
Hope that helps."#;
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Extracted);
        assert_eq!(value["score"], json!(0.7));
    }

    #[test]
    fn cleanup_layer_handles_fences_comments_trailing_commas() {
        let raw = "```json\n{\n  \"score\": 0.4, // model note\n  \"confidence\": 0.8,\n}\n```";
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Cleaned);
        assert_eq!(value["score"], json!(0.4));
        assert_eq!(value["confidence"], json!(0.8));
    }

    #[test]
    fn noisy_and_clean_input_decode_to_equivalent_values() {
        let clean = r#"{"score": 0.4, "confidence": 0.8}"#;
        let noisy = "Response below.\n```json\n{\"score\": 0.4, \"confidence\": 0.8,}\n```\nDone.";
        let (clean_value, _) = decode(clean, FIELDS).unwrap();
        let (noisy_value, _) = decode(noisy, FIELDS).unwrap();
        assert_eq!(clean_value, noisy_value);
    }

    #[test]
    fn repair_layer_closes_truncated_output() {
        let raw = r#"{"score": 0.9, "factors": ["amount spike", "new claimant"#;
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Repaired);
        assert_eq!(value["score"], json!(0.9));
        assert_eq!(value["factors"][0], json!("amount spike"));
    }

    #[test]
    fn repair_layer_swaps_single_quotes() {
        let raw = "{'score': 0.3, 'confidence': 0.7}";
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Repaired);
        assert_eq!(value["score"], json!(0.3));
    }

    #[test]
    fn partial_layer_scrapes_individual_fields() {
        let raw = "The score: 0.65 overall, with confidence: 0.5 given limited data ---";
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Partial);
        assert_eq!(value["score"], json!(0.65));
    }

    #[test]
    fn pure_garbage_fails_every_layer() {
        let err = decode("I cannot help with that request.", FIELDS).unwrap_err();
        assert!(err.response_len > 0);
    }

    #[test]
    fn comment_slashes_inside_strings_survive_cleanup() {
        let raw = r#"{"factors": ["see https://example.com/report"], "score": 0.1}"#;
        let (value, layer) = decode(raw, FIELDS).unwrap();
        assert_eq!(layer, DecodeLayer::Strict);
        assert_eq!(value["factors"][0], json!("see https://example.com/report"));
    }
}
