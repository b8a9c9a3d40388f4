//! FHIR JSON to SOFA score rows.
//!
//! Accepts the raw Observation and MedicationAdministration resources fetched
//! for a patient, either as a JSON array of resources or as a `Bundle`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sofa_core::{InfusionReading, Observation, PatientScores, ScoringConfig, SofaError};
use tracing::{info, warn};

pub mod codes;
pub mod medications;
pub mod observations;
pub mod value;

pub use codes::{ClassificationTable, PressorVocabulary, Vocabulary};
pub use medications::extract_infusions;
pub use observations::{
    derive_mean_arterial_pressure, extract_observations, respiratory_support_instants,
};

/// Everything the scoring engine needs from one patient's raw records.
#[derive(Debug, Clone, Default)]
pub struct PatientExtract {
    pub observations: Vec<Observation>,
    pub infusions: Vec<InfusionReading>,
    pub support: Vec<DateTime<Utc>>,
}

/// Raw inputs for one patient. `None` means the collection was not supplied.
#[derive(Debug, Clone)]
pub struct PatientInput {
    pub patient_id: String,
    pub observations: Option<Value>,
    pub medications: Option<Value>,
}

/// Resources inside a JSON document: an array, a `Bundle`, or one resource.
pub fn resource_list(document: &Value) -> Result<Vec<&Value>, SofaError> {
    if let Some(items) = document.as_array() {
        return Ok(items.iter().collect());
    }

    let resource_type = document
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or(SofaError::MissingData)?;

    if resource_type != "Bundle" {
        return Ok(vec![document]);
    }

    Ok(document
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|entry| entry.get("resource")).collect())
        .unwrap_or_default())
}

/// Extract readings, infusions and respiratory support hints.
pub fn extract_patient(
    observation_resources: &[&Value],
    medication_resources: &[&Value],
    vocabulary: &Vocabulary,
) -> PatientExtract {
    PatientExtract {
        observations: extract_observations(observation_resources, &vocabulary.metrics),
        infusions: extract_infusions(medication_resources, &vocabulary.pressors),
        support: respiratory_support_instants(observation_resources),
    }
}

/// Score one patient from parsed JSON documents.
pub fn score_patient_value(
    patient_id: &str,
    observations: Option<&Value>,
    medications: Option<&Value>,
    vocabulary: &Vocabulary,
    config: &ScoringConfig,
) -> Result<PatientScores, SofaError> {
    let observation_resources = match observations {
        Some(document) => resource_list(document)?,
        None => Vec::new(),
    };
    let medication_resources = match medications {
        Some(document) => resource_list(document)?,
        None => Vec::new(),
    };

    let extract = extract_patient(&observation_resources, &medication_resources, vocabulary);
    info!(
        patient = patient_id,
        observations = extract.observations.len(),
        infusions = extract.infusions.len(),
        "extracted patient records"
    );

    sofa_core::score_patient(
        patient_id,
        &extract.observations,
        &extract.infusions,
        &extract.support,
        config,
    )
}

/// Score one patient from JSON strings.
pub fn score_patient_str(
    patient_id: &str,
    observations_json: &str,
    medications_json: Option<&str>,
    vocabulary: &Vocabulary,
    config: &ScoringConfig,
) -> Result<PatientScores, SofaError> {
    let observations: Value = serde_json::from_str(observations_json)
        .map_err(|err| SofaError::Parse(err.to_string()))?;
    let medications: Option<Value> = medications_json
        .map(|json| serde_json::from_str::<Value>(json))
        .transpose()
        .map_err(|err| SofaError::Parse(err.to_string()))?;

    score_patient_value(
        patient_id,
        Some(&observations),
        medications.as_ref(),
        vocabulary,
        config,
    )
}

/// Score independent patients in input order.
///
/// Fails only on invalid configuration or when no patient supplied either
/// collection. A patient whose documents cannot be read gets an empty result.
pub fn score_cohort(
    patients: &[PatientInput],
    vocabulary: &Vocabulary,
    config: &ScoringConfig,
) -> Result<Vec<PatientScores>, SofaError> {
    config.validate()?;

    if patients
        .iter()
        .all(|p| p.observations.is_none() && p.medications.is_none())
    {
        return Err(SofaError::MissingData);
    }

    let mut results = Vec::with_capacity(patients.len());
    for patient in patients {
        let scores = match score_patient_value(
            &patient.patient_id,
            patient.observations.as_ref(),
            patient.medications.as_ref(),
            vocabulary,
            config,
        ) {
            Ok(scores) => scores,
            Err(err @ SofaError::InvalidConfig(_)) => return Err(err),
            Err(err) => {
                warn!(patient = %patient.patient_id, error = %err, "unusable patient records, skipping");
                PatientScores::empty(&patient.patient_id)
            }
        };
        if scores.rows.is_empty() {
            warn!(patient = %patient.patient_id, "no complete SOFA rows");
        }
        results.push(scores);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_entries_are_unwrapped() {
        let bundle = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Observation", "id": "1"}},
                {"fullUrl": "urn:uuid:missing"},
                {"resource": {"resourceType": "Observation", "id": "2"}}
            ]
        });
        let resources = resource_list(&bundle).unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[test]
    fn arrays_and_single_resources_are_accepted() {
        let array = json!([{"id": "1"}, {"id": "2"}]);
        assert_eq!(resource_list(&array).unwrap().len(), 2);

        let single = json!({"resourceType": "Observation"});
        assert_eq!(resource_list(&single).unwrap().len(), 1);

        assert!(matches!(
            resource_list(&json!({"id": "x"})),
            Err(SofaError::MissingData)
        ));
    }

    #[test]
    fn cohort_without_any_collection_fails() {
        let patients = vec![PatientInput {
            patient_id: "a".to_string(),
            observations: None,
            medications: None,
        }];
        assert!(matches!(
            score_cohort(&patients, &Vocabulary::default(), &ScoringConfig::default()),
            Err(SofaError::MissingData)
        ));
    }

    #[test]
    fn cohort_with_one_empty_patient_still_scores() {
        let patients = vec![
            PatientInput {
                patient_id: "a".to_string(),
                observations: Some(json!([])),
                medications: None,
            },
            PatientInput {
                patient_id: "b".to_string(),
                observations: None,
                medications: None,
            },
        ];
        let results =
            score_cohort(&patients, &Vocabulary::default(), &ScoringConfig::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.rows.is_empty()));
    }

    #[test]
    fn unusable_document_does_not_sink_the_cohort() {
        let at = "2024-01-01T10:00:00Z";
        let patients = vec![
            PatientInput {
                patient_id: "a".to_string(),
                observations: Some(json!([
                    {"code": {"coding": [{"code": "2703-7"}]}, "valueQuantity": {"value": 90}, "effectiveDateTime": at},
                    {"code": {"coding": [{"code": "777-3"}]}, "valueQuantity": {"value": 160}, "effectiveDateTime": at},
                    {"code": {"coding": [{"code": "1975-2"}]}, "valueQuantity": {"value": 0.5}, "effectiveDateTime": at},
                    {"code": {"coding": [{"code": "2160-0"}]}, "valueQuantity": {"value": 0.7}, "effectiveDateTime": at},
                    {"code": {"coding": [{"code": "8478-0"}]}, "valueQuantity": {"value": 60}, "effectiveDateTime": at}
                ])),
                medications: None,
            },
            PatientInput {
                patient_id: "b".to_string(),
                observations: Some(json!({})),
                medications: Some(Value::Null),
            },
        ];
        let results =
            score_cohort(&patients, &Vocabulary::default(), &ScoringConfig::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rows.len(), 1);
        assert_eq!(results[0].rows[0].total_score, 1);
        assert_eq!(results[1], PatientScores::empty("b"));
    }

    #[test]
    fn invalid_config_still_fails_the_cohort() {
        let patients = vec![PatientInput {
            patient_id: "a".to_string(),
            observations: Some(json!([])),
            medications: None,
        }];
        let config = ScoringConfig {
            window: sofa_core::WindowMode::Custom { hours: 0 },
            ..ScoringConfig::default()
        };
        assert!(matches!(
            score_cohort(&patients, &Vocabulary::default(), &config),
            Err(SofaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let result = score_patient_str(
            "a",
            "{not json",
            None,
            &Vocabulary::default(),
            &ScoringConfig::default(),
        );
        assert!(matches!(result, Err(SofaError::Parse(_))));
    }
}
