//! Code and keyword tables used to classify FHIR resources.

use std::collections::HashMap;

use sofa_core::{Drug, Metric};

/// LOINC code to metric, in lookup order.
const LOINC_CODES: [(&str, Metric); 11] = [
    ("2703-7", Metric::PaO2),
    ("3150-0", Metric::FiO2),
    ("59408-5", Metric::SpO2),
    ("2708-6", Metric::SpO2),
    ("8478-0", Metric::MeanArterialPressure),
    ("777-3", Metric::Platelets),
    ("1975-2", Metric::Bilirubin),
    ("2160-0", Metric::Creatinine),
    ("9269-2", Metric::Gcs),
    ("8480-6", Metric::SystolicBp),
    ("8462-4", Metric::DiastolicBp),
];

const DISPLAY_KEYWORDS: [(Metric, &[&str]); 10] = [
    (
        Metric::PaO2,
        &["pao2", "partial pressure oxygen", "arterial oxygen"],
    ),
    (
        Metric::FiO2,
        &[
            "fio2",
            "inspired oxygen",
            "fraction of inspired oxygen",
            "inhaled oxygen",
        ],
    ),
    (
        Metric::SpO2,
        &["spo2", "oxygen saturation", "pulse oximetry"],
    ),
    (
        Metric::MeanArterialPressure,
        &["map", "mean arterial pressure"],
    ),
    (Metric::Platelets, &["platelet"]),
    (Metric::Bilirubin, &["bilirubin"]),
    (Metric::Creatinine, &["creatinine"]),
    (Metric::Gcs, &["glasgow coma", "gcs total", "gcs score"]),
    (Metric::SystolicBp, &["systolic"]),
    (Metric::DiastolicBp, &["diastolic"]),
];

const PRESSOR_KEYWORDS: [(Drug, &[&str]); 4] = [
    (Drug::Norepinephrine, &["norepinephrine", "levophed"]),
    (Drug::Epinephrine, &["epinephrine", "adrenaline"]),
    (Drug::Dopamine, &["dopamine"]),
    (Drug::Dobutamine, &["dobutamine"]),
];

const VENT_KEYWORDS: [&str; 9] = [
    "ventilator",
    "mechanical ventilation",
    "intubated",
    "cpap",
    "bipap",
    "high flow",
    "oxygen therapy",
    "o2 device",
    "respiratory support",
];

/// Maps observation codes to metrics, with a keyword fallback on display text.
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    codes: HashMap<String, Metric>,
    keywords: Vec<(Metric, Vec<String>)>,
}

impl ClassificationTable {
    /// Start from an empty table.
    pub fn new() -> Self {
        Self {
            codes: HashMap::new(),
            keywords: Vec::new(),
        }
    }

    /// The standard LOINC table with display keyword fallback.
    pub fn loinc() -> Self {
        let mut table = Self::new();
        for (code, metric) in LOINC_CODES {
            table = table.with_code(code, metric);
        }
        for (metric, keywords) in DISPLAY_KEYWORDS {
            table = table.with_keywords(metric, keywords.iter().copied());
        }
        table
    }

    pub fn with_code(mut self, code: impl Into<String>, metric: Metric) -> Self {
        self.codes.insert(code.into(), metric);
        self
    }

    /// Keywords are tried in the order metrics were first added.
    pub fn with_keywords<I, S>(mut self, metric: Metric, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords.into_iter().map(|k| k.into().to_lowercase());
        match self.keywords.iter_mut().find(|(m, _)| *m == metric) {
            Some((_, existing)) => existing.extend(keywords),
            None => self.keywords.push((metric, keywords.collect())),
        }
        self
    }

    /// Code lookup first; otherwise the first metric whose keyword occurs in `text`.
    pub fn classify(&self, code: Option<&str>, text: &str) -> Option<Metric> {
        if let Some(metric) = code.and_then(|code| self.codes.get(code.trim())) {
            return Some(*metric);
        }

        let text = text.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw.as_str())))
            .map(|(metric, _)| *metric)
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self::loinc()
    }
}

/// Free-text vocabulary for vasoactive drugs. First match wins.
#[derive(Debug, Clone)]
pub struct PressorVocabulary {
    entries: Vec<(Drug, Vec<String>)>,
}

impl PressorVocabulary {
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Drug, Vec<String>)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(drug, synonyms)| {
                    (drug, synonyms.into_iter().map(|s| s.to_lowercase()).collect())
                })
                .collect(),
        }
    }

    pub fn classify(&self, text: &str) -> Option<Drug> {
        let text = text.to_lowercase();
        self.entries
            .iter()
            .find(|(_, synonyms)| synonyms.iter().any(|s| text.contains(s.as_str())))
            .map(|(drug, _)| *drug)
    }
}

impl Default for PressorVocabulary {
    fn default() -> Self {
        Self::new(PRESSOR_KEYWORDS.iter().map(|(drug, synonyms)| {
            (*drug, synonyms.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        }))
    }
}

/// Both lookup tables the extractors need.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub metrics: ClassificationTable,
    pub pressors: PressorVocabulary,
}

/// Whether free text describes ventilation or other respiratory support.
pub fn looks_like_respiratory_support(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    VENT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_win_over_text() {
        let table = ClassificationTable::loinc();
        assert_eq!(table.classify(Some("777-3"), "creatinine"), Some(Metric::Platelets));
        assert_eq!(table.classify(Some("8480-6"), ""), Some(Metric::SystolicBp));
    }

    #[test]
    fn unknown_codes_fall_back_to_keywords_in_table_order() {
        let table = ClassificationTable::loinc();
        assert_eq!(
            table.classify(Some("x-1"), "Bilirubin.total [Mass/volume]"),
            Some(Metric::Bilirubin)
        );
        // "pao2" is checked before "spo2"
        assert_eq!(table.classify(None, "PaO2 and SpO2"), Some(Metric::PaO2));
        assert_eq!(table.classify(None, "Heart rate"), None);
    }

    #[test]
    fn tables_are_injectable() {
        let table = ClassificationTable::new()
            .with_code("local-42", Metric::Creatinine)
            .with_keywords(Metric::Gcs, ["coma score"]);
        assert_eq!(table.classify(Some("local-42"), ""), Some(Metric::Creatinine));
        assert_eq!(table.classify(Some("2160-0"), ""), None);
        assert_eq!(table.classify(None, "Coma Score"), Some(Metric::Gcs));
    }

    #[test]
    fn norepinephrine_is_not_mistaken_for_epinephrine() {
        let vocabulary = PressorVocabulary::default();
        assert_eq!(
            vocabulary.classify("Norepinephrine 4 MG/250ML"),
            Some(Drug::Norepinephrine)
        );
        assert_eq!(vocabulary.classify("Adrenaline"), Some(Drug::Epinephrine));
        assert_eq!(vocabulary.classify("Levophed"), Some(Drug::Norepinephrine));
        assert_eq!(vocabulary.classify("Vasopressin"), None);
    }

    #[test]
    fn respiratory_support_keywords() {
        assert!(looks_like_respiratory_support("Mechanical ventilation started"));
        assert!(looks_like_respiratory_support("BiPAP mask"));
        assert!(!looks_like_respiratory_support("Room air"));
        assert!(!looks_like_respiratory_support(""));
    }
}
