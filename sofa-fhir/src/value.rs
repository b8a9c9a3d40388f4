//! Small helpers for reading loosely shaped FHIR JSON.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sofa_core::units::parse_instant;

/// Convert a JSON number or numeric string to `f64`; anything else is `None`.
pub fn safe_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// First coding of a codeable concept, if any.
pub(crate) fn first_coding(concept: &Value) -> Option<&Value> {
    concept
        .get("coding")
        .and_then(Value::as_array)
        .and_then(|codings| codings.first())
}

pub(crate) fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Code and searchable text of a codeable concept.
///
/// The text joins the first coding's display (or the concept text when the
/// display is absent) with the concept text.
pub(crate) fn concept_code_and_text(concept: &Value) -> (Option<&str>, String) {
    let coding = first_coding(concept);
    let code = coding.and_then(|c| str_field(c, "code"));
    let concept_text = str_field(concept, "text");
    let display = coding
        .and_then(|c| str_field(c, "display"))
        .or(concept_text);

    let text = format!("{} {}", display.unwrap_or(""), concept_text.unwrap_or(""));
    (code, text)
}

/// First parseable instant among `fields`; periods yield their end, then start.
pub(crate) fn extract_datetime(resource: &Value, fields: &[&str]) -> Option<DateTime<Utc>> {
    for field in fields {
        let Some(value) = resource.get(*field) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            if let Some(dt) = parse_instant(text) {
                return Some(dt);
            }
        }

        if let Some(obj) = value.as_object() {
            for key in ["end", "start"] {
                if let Some(dt) = obj.get(key).and_then(Value::as_str).and_then(parse_instant) {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// Value and unit of a FHIR Quantity.
pub(crate) fn quantity(value: &Value) -> Option<(f64, Option<String>)> {
    let magnitude = value.get("value").and_then(safe_float)?;
    let unit = str_field(value, "unit")
        .or_else(|| str_field(value, "code"))
        .map(str::to_string);
    Some((magnitude, unit))
}
