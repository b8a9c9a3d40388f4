//! MedicationAdministration resources to vasoactive infusion readings.

use serde_json::Value;
use sofa_core::InfusionReading;
use tracing::debug;

use crate::codes::PressorVocabulary;
use crate::value::{extract_datetime, first_coding, safe_float, str_field};

/// Dosage fields holding a rate, highest priority first.
const RATE_FIELDS: [&str; 3] = ["doseRateQuantity", "rateQuantity", "rate"];

const ADMINISTRATION_TIME_FIELDS: [&str; 2] = ["effectiveDateTime", "effectivePeriod"];

pub fn extract_infusions(resources: &[&Value], vocabulary: &PressorVocabulary) -> Vec<InfusionReading> {
    let mut readings: Vec<InfusionReading> = resources
        .iter()
        .filter_map(|resource| infusion_from_resource(resource, vocabulary))
        .collect();

    let dropped = resources.len() - readings.len();
    if dropped > 0 {
        debug!(dropped, kept = readings.len(), "dropped non-pressor medication records");
    }

    readings.sort_by_key(|reading| reading.effective);
    readings
}

fn infusion_from_resource(resource: &Value, vocabulary: &PressorVocabulary) -> Option<InfusionReading> {
    if let Some(kind) = resource.get("resourceType").and_then(Value::as_str) {
        if kind != "MedicationAdministration" {
            return None;
        }
    }

    let drug = vocabulary.classify(&medication_text(resource)?)?;
    let effective = extract_datetime(resource, &ADMINISTRATION_TIME_FIELDS)?;
    let (rate, unit) = dosage(resource).map(dose_rate).unwrap_or((None, None));

    Some(InfusionReading {
        drug,
        rate,
        unit,
        effective,
    })
}

/// First coding display, else its code, else the concept text or a reference display.
fn medication_text(resource: &Value) -> Option<String> {
    let concept = resource.get("medicationCodeableConcept");
    let coding_text = concept.and_then(first_coding).and_then(|coding| {
        str_field(coding, "display").or_else(|| str_field(coding, "code"))
    });

    coding_text
        .or_else(|| concept.and_then(|c| str_field(c, "text")))
        .or_else(|| {
            resource
                .get("medicationReference")
                .and_then(|reference| str_field(reference, "display"))
        })
        .map(str::to_lowercase)
}

fn dosage(resource: &Value) -> Option<&Value> {
    let dosage = resource.get("dosage")?;
    match dosage {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(dosage),
        _ => None,
    }
}

/// The first rate field that carries a `value` key wins, even if that value
/// does not parse.
fn dose_rate(dosage: &Value) -> (Option<f64>, Option<String>) {
    for field in RATE_FIELDS {
        let Some(quantity) = dosage.get(field).and_then(Value::as_object) else {
            continue;
        };
        let Some(value) = quantity.get("value") else {
            continue;
        };
        let unit = quantity
            .get("unit")
            .or_else(|| quantity.get("code"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return (safe_float(value), unit);
    }
    (None, None)
}
