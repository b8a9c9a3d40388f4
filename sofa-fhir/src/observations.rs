//! Observation resources to metric readings.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sofa_core::{Metric, Observation};
use tracing::debug;

use crate::codes::{looks_like_respiratory_support, ClassificationTable};
use crate::value::{concept_code_and_text, extract_datetime, quantity, str_field};

const OBSERVATION_TIME_FIELDS: [&str; 4] = [
    "effectiveDateTime",
    "effectiveInstant",
    "effectivePeriod",
    "issued",
];

const SUPPORT_TIME_FIELDS: [&str; 6] = [
    "effectiveDateTime",
    "effectiveInstant",
    "effectivePeriod",
    "performedDateTime",
    "performedPeriod",
    "issued",
];

/// Systolic and diastolic readings further apart than this are not paired.
pub const MAP_PAIRING_TOLERANCE_MINUTES: i64 = 5;

/// Extract every classifiable, valued, timed reading, plus MAP derived from
/// systolic/diastolic pairs.
///
/// Direct readings come out sorted by time (ties keep input order); derived
/// MAP points follow them.
pub fn extract_observations(resources: &[&Value], table: &ClassificationTable) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut dropped = 0usize;

    for resource in resources {
        let before = observations.len();
        observations.extend(observation_entries(resource, table));
        if observations.len() == before {
            dropped += 1;
        }
    }

    if dropped > 0 {
        debug!(dropped, kept = observations.len(), "dropped unusable observation records");
    }

    observations.sort_by_key(|o| o.effective);
    let derived = derive_mean_arterial_pressure(&observations);
    if !derived.is_empty() {
        debug!(count = derived.len(), "derived MAP from blood pressure pairs");
    }
    observations.extend(derived);
    observations
}

fn observation_entries(resource: &Value, table: &ClassificationTable) -> Vec<Observation> {
    if !is_resource_type(resource, "Observation") {
        return Vec::new();
    }
    let Some(effective) = extract_datetime(resource, &OBSERVATION_TIME_FIELDS) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    if let Some(entry) = reading(resource, table, effective) {
        entries.push(entry);
    }

    // multi-component panels such as blood pressure
    if let Some(components) = resource.get("component").and_then(Value::as_array) {
        entries.extend(
            components
                .iter()
                .filter_map(|component| reading(component, table, effective)),
        );
    }

    entries
}

fn reading(item: &Value, table: &ClassificationTable, effective: DateTime<Utc>) -> Option<Observation> {
    let (code, text) = concept_code_and_text(item.get("code")?);
    let metric = table.classify(code, &text)?;
    let (value, unit) = quantity(item.get("valueQuantity")?)?;
    Some(Observation {
        metric,
        value,
        unit,
        effective,
    })
}

fn is_resource_type(resource: &Value, expected: &str) -> bool {
    match resource.get("resourceType").and_then(Value::as_str) {
        Some(kind) => kind == expected,
        None => true,
    }
}

/// Pair each systolic reading with the nearest diastolic reading within the
/// tolerance and emit `(sys + 2 * dia) / 3` at the systolic instant.
///
/// Equidistant diastolic readings resolve to the earlier one.
pub fn derive_mean_arterial_pressure(observations: &[Observation]) -> Vec<Observation> {
    let tolerance = Duration::minutes(MAP_PAIRING_TOLERANCE_MINUTES);

    let mut diastolic: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.metric == Metric::DiastolicBp)
        .collect();
    diastolic.sort_by_key(|o| o.effective);

    let mut systolic: Vec<&Observation> = observations
        .iter()
        .filter(|o| o.metric == Metric::SystolicBp)
        .collect();
    systolic.sort_by_key(|o| o.effective);

    systolic
        .into_iter()
        .filter_map(|sys| {
            let dia = nearest(&diastolic, sys.effective, tolerance)?;
            Some(Observation {
                metric: Metric::MeanArterialPressure,
                value: (sys.value + 2.0 * dia.value) / 3.0,
                unit: Some("mmHg".to_string()),
                effective: sys.effective,
            })
        })
        .collect()
}

fn nearest<'a>(
    sorted: &[&'a Observation],
    at: DateTime<Utc>,
    tolerance: Duration,
) -> Option<&'a Observation> {
    let idx = sorted.partition_point(|o| o.effective < at);
    let before = idx.checked_sub(1).and_then(|i| sorted.get(i));
    let after = sorted.get(idx);

    let best = match (before, after) {
        (Some(b), Some(a)) => {
            if at - b.effective <= a.effective - at {
                b
            } else {
                a
            }
        }
        (Some(b), None) => b,
        (None, Some(a)) => a,
        (None, None) => return None,
    };

    let gap = if best.effective >= at {
        best.effective - at
    } else {
        at - best.effective
    };
    (gap <= tolerance).then_some(*best)
}

/// Instants at which a resource mentions ventilation or other respiratory support.
pub fn respiratory_support_instants(resources: &[&Value]) -> Vec<DateTime<Utc>> {
    let mut instants: Vec<DateTime<Utc>> = resources
        .iter()
        .filter(|resource| mentions_support(resource))
        .filter_map(|resource| extract_datetime(resource, &SUPPORT_TIME_FIELDS))
        .collect();
    instants.sort();
    instants.dedup();
    instants
}

fn mentions_support(resource: &Value) -> bool {
    let mut texts = Vec::new();
    for field in ["code", "valueCodeableConcept"] {
        if let Some(concept) = resource.get(field) {
            texts.push(concept_code_and_text(concept).1);
        }
    }
    if let Some(value) = str_field(resource, "valueString") {
        texts.push(value.to_string());
    }
    texts.iter().any(|text| looks_like_respiratory_support(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 4, 10, minute, 0).unwrap()
    }

    fn bp(metric: Metric, value: f64, effective: DateTime<Utc>) -> Observation {
        Observation {
            metric,
            value,
            unit: Some("mmHg".to_string()),
            effective,
        }
    }

    #[test]
    fn map_pairs_within_tolerance() {
        let derived = derive_mean_arterial_pressure(&[
            bp(Metric::SystolicBp, 120.0, t(0)),
            bp(Metric::DiastolicBp, 80.0, t(2)),
        ]);
        assert_eq!(derived.len(), 1);
        assert!((derived[0].value - 93.333_333).abs() < 1e-3);
        assert_eq!(derived[0].effective, t(0));
        assert_eq!(derived[0].metric, Metric::MeanArterialPressure);
    }

    #[test]
    fn map_is_not_derived_outside_tolerance() {
        let derived = derive_mean_arterial_pressure(&[
            bp(Metric::SystolicBp, 120.0, t(0)),
            bp(Metric::DiastolicBp, 80.0, t(10)),
        ]);
        assert!(derived.is_empty());

        let edge = derive_mean_arterial_pressure(&[
            bp(Metric::SystolicBp, 120.0, t(10)),
            bp(Metric::DiastolicBp, 60.0, t(5)),
        ]);
        assert_eq!(edge.len(), 1);
    }

    #[test]
    fn map_picks_nearest_and_earlier_on_tie() {
        let derived = derive_mean_arterial_pressure(&[
            bp(Metric::DiastolicBp, 60.0, t(8)),
            bp(Metric::DiastolicBp, 90.0, t(12)),
            bp(Metric::SystolicBp, 150.0, t(10)),
            bp(Metric::SystolicBp, 120.0, t(13)),
        ]);
        assert_eq!(derived.len(), 2);
        assert!((derived[0].value - 90.0).abs() < 1e-9);
        assert!((derived[1].value - 100.0).abs() < 1e-9);
    }

    #[test]
    fn blood_pressure_panel_components_yield_derived_map() {
        let panel = json!({
            "resourceType": "Observation",
            "code": {"coding": [{"code": "85354-9", "display": "Blood pressure panel"}]},
            "effectiveDateTime": "2024-04-04T10:00:00Z",
            "component": [
                {
                    "code": {"coding": [{"code": "8480-6", "display": "Systolic blood pressure"}]},
                    "valueQuantity": {"value": 120, "unit": "mm[Hg]"}
                },
                {
                    "code": {"coding": [{"code": "8462-4", "display": "Diastolic blood pressure"}]},
                    "valueQuantity": {"value": 80, "unit": "mm[Hg]"}
                }
            ]
        });
        let observations = extract_observations(&[&panel], &ClassificationTable::loinc());
        let metrics: Vec<_> = observations.iter().map(|o| o.metric).collect();
        assert_eq!(
            metrics,
            vec![Metric::SystolicBp, Metric::DiastolicBp, Metric::MeanArterialPressure]
        );
    }

    #[test]
    fn coded_and_derived_map_coexist() {
        let coded = json!({
            "code": {"coding": [{"code": "8478-0"}]},
            "valueQuantity": {"value": 70, "unit": "mmHg"},
            "effectiveDateTime": "2024-04-04T10:00:00Z"
        });
        let sys = json!({
            "code": {"coding": [{"code": "8480-6"}]},
            "valueQuantity": {"value": 120},
            "effectiveDateTime": "2024-04-04T10:00:00Z"
        });
        let dia = json!({
            "code": {"coding": [{"code": "8462-4"}]},
            "valueQuantity": {"value": 80},
            "effectiveDateTime": "2024-04-04T10:01:00Z"
        });
        let observations = extract_observations(&[&coded, &sys, &dia], &ClassificationTable::loinc());
        let maps: Vec<_> = observations
            .iter()
            .filter(|o| o.metric == Metric::MeanArterialPressure)
            .map(|o| o.value)
            .collect();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0], 70.0);
    }

    #[test]
    fn unusable_records_are_dropped() {
        let no_value = json!({
            "code": {"coding": [{"code": "777-3"}]},
            "effectiveDateTime": "2024-04-04T10:00:00Z"
        });
        let no_time = json!({
            "code": {"coding": [{"code": "777-3"}]},
            "valueQuantity": {"value": 100}
        });
        let bad_time = json!({
            "code": {"coding": [{"code": "777-3"}]},
            "valueQuantity": {"value": 100},
            "effectiveDateTime": "not a date"
        });
        let unknown = json!({
            "code": {"coding": [{"code": "8867-4", "display": "Heart rate"}]},
            "valueQuantity": {"value": 88},
            "effectiveDateTime": "2024-04-04T10:00:00Z"
        });
        let other_type = json!({
            "resourceType": "Condition",
            "code": {"coding": [{"code": "777-3"}]},
            "valueQuantity": {"value": 100},
            "effectiveDateTime": "2024-04-04T10:00:00Z"
        });
        let observations = extract_observations(
            &[&no_value, &no_time, &bad_time, &unknown, &other_type],
            &ClassificationTable::loinc(),
        );
        assert!(observations.is_empty());
    }

    #[test]
    fn issued_is_used_when_effective_missing() {
        let record = json!({
            "code": {"text": "Creatinine [Mass/volume] in Serum"},
            "valueQuantity": {"value": "1.4", "unit": "mg/dL"},
            "issued": "2024-04-04T12:00:00+02:00"
        });
        let observations = extract_observations(&[&record], &ClassificationTable::loinc());
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].metric, Metric::Creatinine);
        assert_eq!(observations[0].value, 1.4);
        assert_eq!(observations[0].effective, t(0));
    }

    #[test]
    fn support_instants_come_from_text() {
        let vent = json!({
            "code": {"text": "Ventilator settings"},
            "effectiveDateTime": "2024-04-04T10:05:00Z"
        });
        let plain = json!({
            "code": {"text": "Platelets"},
            "effectiveDateTime": "2024-04-04T10:06:00Z"
        });
        assert_eq!(respiratory_support_instants(&[&vent, &plain]), vec![t(5)]);
    }
}
