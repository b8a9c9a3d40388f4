//! Bridge WASM <-> JavaScript cho việc tính điểm SOFA.

use serde::Deserialize;
use serde_wasm_bindgen::{from_value, to_value};
use sofa_core::{ScoringConfig, SofaError, WindowMode};
use sofa_fhir::Vocabulary;
use wasm_bindgen::prelude::*;

#[derive(Deserialize, Default)]
struct JsScoringConfig {
    #[serde(default)]
    window_hours: Option<u32>,
    #[serde(default)]
    demo: Option<bool>,
    #[serde(default)]
    default_fio2: Option<f64>,
    #[serde(default)]
    pressor_rate_units: Option<Vec<String>>,
    #[serde(default)]
    detect_respiratory_support: Option<bool>,
}

impl From<JsScoringConfig> for ScoringConfig {
    fn from(cfg: JsScoringConfig) -> Self {
        let mut base = ScoringConfig::default();
        if cfg.demo == Some(true) {
            base.window = WindowMode::Demo;
        }
        if let Some(hours) = cfg.window_hours {
            base.window = WindowMode::Custom { hours };
        }
        if let Some(fio2) = cfg.default_fio2 {
            base.default_fio2 = fio2;
        }
        if let Some(units) = cfg.pressor_rate_units {
            base.pressor_rate_units = units;
        }
        if let Some(detect) = cfg.detect_respiratory_support {
            base.detect_respiratory_support = detect;
        }
        base
    }
}

#[wasm_bindgen]
pub fn score_patient(
    patient_id: String,
    observations: JsValue,
    medications: Option<JsValue>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let observations = from_value::<serde_json::Value>(observations)
        .map_err(|err| JsValue::from_str(&format!("Không đọc được JSON observation: {err}")))?;

    let medications = medications
        .map(from_value::<serde_json::Value>)
        .transpose()
        .map_err(|err| JsValue::from_str(&format!("Không đọc được JSON medication: {err}")))?;

    let cfg = match config {
        Some(js_cfg) => {
            let cfg: JsScoringConfig = from_value(js_cfg)
                .map_err(|err| JsValue::from_str(&format!("Không đọc được config: {err}")))?;
            ScoringConfig::from(cfg)
        }
        None => ScoringConfig::default(),
    };

    let scores = sofa_fhir::score_patient_value(
        &patient_id,
        Some(&observations),
        medications.as_ref(),
        &Vocabulary::default(),
        &cfg,
    )
    .map_err(|err| JsValue::from_str(&format_sofa_error(err)))?;

    to_value(&scores).map_err(|err| JsValue::from_str(&format!("Không serialize kết quả: {err}")))
}

fn format_sofa_error(err: SofaError) -> String {
    format!("SOFA error: {err}")
}
