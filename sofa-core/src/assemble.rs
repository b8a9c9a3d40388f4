//! Ghép dòng điểm SOFA theo từng thời điểm cho một bệnh nhân.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::scoring::{
    score_cardiovascular, score_cns, score_coagulation, score_liver, score_renal,
    score_respiratory, PressorRates,
};
use crate::series::MetricSeries;
use crate::units::{format_instant, normalize_fio2};
use crate::{
    InfusionReading, Metric, MissingDiagnostic, Observation, PatientScores, ScoredRow,
    ScoringConfig, SofaError, SubScores,
};

/// GCS giả định khi không có giá trị trong cửa sổ (bệnh nhân tỉnh).
const DEFAULT_GCS: f64 = 15.0;

/// Thiếu từ chừng này hệ cơ quan trở lên thì ghi chẩn đoán.
const DIAGNOSTIC_THRESHOLD: usize = 3;

/// Toàn bộ dữ liệu cần để chấm điểm một bệnh nhân.
pub struct PatientContext<'a> {
    series: MetricSeries,
    pressors: HashMap<DateTime<Utc>, PressorRates>,
    support: &'a [DateTime<Utc>],
    config: &'a ScoringConfig,
    look_back: Duration,
}

impl<'a> PatientContext<'a> {
    pub fn new(
        series: MetricSeries,
        infusions: &[InfusionReading],
        support: &'a [DateTime<Utc>],
        config: &'a ScoringConfig,
    ) -> Self {
        Self {
            series,
            pressors: index_pressors(infusions, config),
            support,
            config,
            look_back: config.look_back(),
        }
    }

    /// Chấm sáu hệ cơ quan tại thời điểm `t`.
    pub fn sub_scores_at(&self, t: DateTime<Utc>) -> SubScores {
        let lookup = |metric| self.series.latest_within(metric, t, self.look_back);

        let pao2 = lookup(Metric::PaO2);
        let spo2 = lookup(Metric::SpO2);
        let fio2 = self
            .series
            .latest_point_within(Metric::FiO2, t, self.look_back)
            .and_then(|point| normalize_fio2(Some(point.value), point.unit.as_deref()))
            .unwrap_or(self.config.default_fio2);

        let pf = ratio(pao2, fio2);
        let sf = ratio(spo2, fio2);
        let gcs = lookup(Metric::Gcs).unwrap_or(DEFAULT_GCS);
        let pressors = self.pressors.get(&t).copied().unwrap_or_default();

        SubScores {
            resp: score_respiratory(pf, sf, self.on_support(t)),
            coag: score_coagulation(lookup(Metric::Platelets)),
            liver: score_liver(lookup(Metric::Bilirubin)),
            cardio: score_cardiovascular(lookup(Metric::MeanArterialPressure), &pressors),
            cns: score_cns(Some(gcs)),
            renal: score_renal(lookup(Metric::Creatinine)),
        }
    }

    fn on_support(&self, t: DateTime<Utc>) -> bool {
        if !self.config.detect_respiratory_support {
            return false;
        }
        let start = t.checked_sub_signed(self.look_back);
        self.support
            .iter()
            .any(|at| *at <= t && start.map_or(true, |start| *at >= start))
    }
}

fn ratio(numerator: Option<f64>, fio2: f64) -> Option<f64> {
    if fio2 == 0.0 {
        return None;
    }
    numerator.map(|value| value / fio2)
}

/// Tốc độ truyền theo đúng thời điểm ghi nhận. Bỏ qua bản ghi không có tốc
/// độ hoặc có đơn vị ngoài bộ lọc liều theo cân nặng mỗi phút.
fn index_pressors(
    infusions: &[InfusionReading],
    config: &ScoringConfig,
) -> HashMap<DateTime<Utc>, PressorRates> {
    let mut index: HashMap<DateTime<Utc>, PressorRates> = HashMap::new();
    for reading in infusions {
        let Some(rate) = reading.rate else {
            continue;
        };
        if !config.accepts_rate_unit(reading.unit.as_deref()) {
            debug!(drug = %reading.drug, unit = ?reading.unit, "ignoring pressor rate with unsupported unit");
            continue;
        }
        index.entry(reading.effective).or_default().set(reading.drug, rate);
    }
    index
}

/// Chấm điểm mọi thời điểm ứng viên của một bệnh nhân.
///
/// Chỉ xuất dòng có đủ sáu điểm thành phần. Thời điểm thiếu từ ba hệ cơ quan
/// trở lên được ghi vào chẩn đoán.
pub fn score_patient(
    patient_id: &str,
    observations: &[Observation],
    infusions: &[InfusionReading],
    support: &[DateTime<Utc>],
    config: &ScoringConfig,
) -> Result<PatientScores, SofaError> {
    config.validate()?;

    let series = MetricSeries::from_observations(observations);
    if series.is_empty() {
        warn!(patient = patient_id, "no usable observations, skipping");
        return Ok(PatientScores::empty(patient_id));
    }

    let context = PatientContext::new(series, infusions, support, config);
    let mut scores = PatientScores::empty(patient_id);

    for t in context.series.candidate_timestamps() {
        let sub_scores = context.sub_scores_at(t);
        match ScoredRow::from_sub_scores(patient_id, t, sub_scores) {
            Some(row) => scores.rows.push(row),
            None => {
                let missing = sub_scores.missing();
                if missing.len() >= DIAGNOSTIC_THRESHOLD {
                    let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                    warn!(
                        patient = patient_id,
                        at = %format_instant(t),
                        missing = %names.join(", "),
                        "sub-scores missing"
                    );
                    scores.diagnostics.push(MissingDiagnostic { timestamp: t, missing });
                }
            }
        }
    }

    info!(
        patient = patient_id,
        observations = observations.len(),
        infusions = infusions.len(),
        rows = scores.rows.len(),
        "calculated SOFA rows"
    );
    Ok(scores)
}
