use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::Value;
use sofa_core::{PatientScores, ScoredRow, ScoringConfig, WindowMode};
use sofa_fhir::{score_cohort, PatientInput, Vocabulary};
use tracing::{info, warn};

mod logging;

use crate::logging::{init_logging, level_from_verbosity, LogFormat};

const OBSERVATION_FILE: &str = "Observation.json";
const MEDICATION_FILE: &str = "MedicationAdministration.json";
const CSV_HEADER: [&str; 3] = ["patient_id", "sofa_score_datetime", "sofa_score"];

#[derive(Parser, Debug)]
#[command(
    name = "sofa-cli",
    about = "Compute SOFA scores from per-patient FHIR JSON exports."
)]
struct Args {
    /// Directory with one sub-directory per patient holding
    /// `Observation.json` and/or `MedicationAdministration.json`.
    #[arg(short, long)]
    data_dir: PathBuf,

    /// Patients to score (comma separated). Defaults to every sub-directory.
    #[arg(short, long, value_delimiter = ',')]
    patients: Vec<String>,

    /// Output CSV path.
    #[arg(short, long, default_value = "submission.csv")]
    output: PathBuf,

    /// JSON file with scoring configuration; missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Relaxed 24h look-back window instead of the clinical 6h.
    #[arg(long)]
    demo: bool,

    /// Explicit look-back window in hours (overrides --demo).
    #[arg(long)]
    window_hours: Option<u32>,

    /// FiO2 fraction assumed when none is observed.
    #[arg(long)]
    default_fio2: Option<f64>,

    /// Score SpO2/FiO2 as supported when ventilation is mentioned in the window.
    #[arg(long)]
    detect_respiratory_support: bool,

    /// More output per occurrence (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(level_from_verbosity(args.verbose), args.log_format);

    let config = build_config(&args)?;
    config.validate()?;

    let patient_ids = if args.patients.is_empty() {
        discover_patients(&args.data_dir)?
    } else {
        args.patients.clone()
    };

    let inputs: Vec<PatientInput> = patient_ids
        .iter()
        .map(|id| load_patient(&args.data_dir, id))
        .collect();

    let results = score_cohort(&inputs, &Vocabulary::default(), &config)?;
    let written = write_csv(&args.output, &results)?;

    println!(
        "{} written with {written} rows ({} patients, {}h window)",
        args.output.display(),
        results.len(),
        config.window_hours()
    );

    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<ScoringConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Could not read config {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ScoringConfig::default(),
    };

    if args.demo {
        config.window = WindowMode::Demo;
    }
    if let Some(hours) = args.window_hours {
        config.window = WindowMode::Custom { hours };
    }
    if let Some(fio2) = args.default_fio2 {
        config.default_fio2 = fio2;
    }
    if args.detect_respiratory_support {
        config.detect_respiratory_support = true;
    }
    Ok(config)
}

fn discover_patients(data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("Could not list {}", data_dir.display()))?;

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();

    if ids.is_empty() {
        bail!("No patient directories found in {}", data_dir.display());
    }
    Ok(ids)
}

/// A file that cannot be read or parsed is logged and treated as absent.
fn load_patient(data_dir: &Path, patient_id: &str) -> PatientInput {
    let dir = data_dir.join(patient_id);
    let load = |file: &str| {
        read_optional_json(&dir.join(file)).unwrap_or_else(|err| {
            warn!(patient = patient_id, error = %format!("{err:#}"), "skipping unreadable file");
            None
        })
    };
    PatientInput {
        patient_id: patient_id.to_string(),
        observations: load(OBSERVATION_FILE),
        medications: load(MEDICATION_FILE),
    }
}

fn read_optional_json(path: &Path) -> anyhow::Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let value = serde_json::from_str(&data)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(Some(value))
}

/// Write every row; the header is written even when there are none.
fn write_csv(path: &Path, results: &[PatientScores]) -> anyhow::Result<usize> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Could not create {}", path.display()))?;

    writer.write_record(CSV_HEADER)?;
    let rows: Vec<&ScoredRow> = results.iter().flat_map(|r| r.rows.iter()).collect();
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(rows = rows.len(), path = %path.display(), "wrote CSV");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(data_dir: &Path) -> Args {
        Args::parse_from(["sofa-cli", "--data-dir", data_dir.to_str().unwrap()])
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, r#"{"default_fio2": 0.3}"#).unwrap();

        let mut parsed = args(dir.path());
        parsed.config = Some(config_path);
        parsed.demo = true;
        let config = build_config(&parsed).unwrap();
        assert_eq!(config.window_hours(), 24);
        assert_eq!(config.default_fio2, 0.3);

        parsed.window_hours = Some(8);
        assert_eq!(build_config(&parsed).unwrap().window_hours(), 8);
    }

    #[test]
    fn patients_are_discovered_and_loaded() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("a").join(OBSERVATION_FILE), "[]").unwrap();

        assert_eq!(discover_patients(dir.path()).unwrap(), vec!["a", "b"]);

        let a = load_patient(dir.path(), "a");
        assert_eq!(a.observations, Some(json!([])));
        assert_eq!(a.medications, None);
    }

    #[test]
    fn invalid_json_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let patient_dir = dir.path().join("c");
        fs::create_dir(&patient_dir).unwrap();
        fs::write(patient_dir.join(OBSERVATION_FILE), "{not json").unwrap();
        fs::write(patient_dir.join(MEDICATION_FILE), "[]").unwrap();

        let c = load_patient(dir.path(), "c");
        assert_eq!(c.observations, None);
        assert_eq!(c.medications, Some(json!([])));
    }

    #[test]
    fn csv_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let observations = json!([
            {"code": {"coding": [{"code": "2703-7"}]}, "valueQuantity": {"value": 90}, "effectiveDateTime": "2024-01-01T10:00:00Z"},
            {"code": {"coding": [{"code": "777-3"}]}, "valueQuantity": {"value": 160}, "effectiveDateTime": "2024-01-01T10:00:00Z"},
            {"code": {"coding": [{"code": "1975-2"}]}, "valueQuantity": {"value": 0.5}, "effectiveDateTime": "2024-01-01T10:00:00Z"},
            {"code": {"coding": [{"code": "2160-0"}]}, "valueQuantity": {"value": 0.7}, "effectiveDateTime": "2024-01-01T10:00:00Z"},
            {"code": {"coding": [{"code": "8478-0"}]}, "valueQuantity": {"value": 60}, "effectiveDateTime": "2024-01-01T10:00:00Z"}
        ]);
        let inputs = vec![PatientInput {
            patient_id: "a".to_string(),
            observations: Some(observations),
            medications: None,
        }];
        let results = score_cohort(&inputs, &Vocabulary::default(), &ScoringConfig::default()).unwrap();

        let path = dir.path().join("out.csv");
        assert_eq!(write_csv(&path, &results).unwrap(), 1);
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "patient_id,sofa_score_datetime,sofa_score\na,2024-01-01T10:00:00Z,1\n"
        );
    }

    #[test]
    fn empty_results_still_write_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        assert_eq!(write_csv(&path, &[]).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "patient_id,sofa_score_datetime,sofa_score\n"
        );
    }
}
