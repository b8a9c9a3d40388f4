//! Logic lõi tính điểm SOFA từ chuỗi quan sát lâm sàng không đều.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

pub mod assemble;
pub mod config;
pub mod scoring;
pub mod series;
pub mod units;

pub use assemble::score_patient;
pub use config::{ScoringConfig, WindowMode, MAX_WINDOW_HOURS};
pub use scoring::PressorRates;
pub use series::{MetricSeries, SeriesPoint};

/// Chỉ số sinh lý mà bộ trích xuất nhận diện được.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    PaO2,
    FiO2,
    SpO2,
    MeanArterialPressure,
    Platelets,
    Bilirubin,
    Creatinine,
    Gcs,
    /// Chỉ dùng để suy ra MAP, không chấm điểm trực tiếp.
    SystolicBp,
    /// Chỉ dùng để suy ra MAP, không chấm điểm trực tiếp.
    DiastolicBp,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::PaO2 => "PaO2",
            Metric::FiO2 => "FiO2",
            Metric::SpO2 => "SpO2",
            Metric::MeanArterialPressure => "MAP",
            Metric::Platelets => "Platelets",
            Metric::Bilirubin => "Bilirubin",
            Metric::Creatinine => "Creatinine",
            Metric::Gcs => "GCS",
            Metric::SystolicBp => "Systolic BP",
            Metric::DiastolicBp => "Diastolic BP",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Thuốc vận mạch được nhận diện.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Drug {
    Norepinephrine,
    Epinephrine,
    Dopamine,
    Dobutamine,
}

impl fmt::Display for Drug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Drug::Norepinephrine => "norepinephrine",
            Drug::Epinephrine => "epinephrine",
            Drug::Dopamine => "dopamine",
            Drug::Dobutamine => "dobutamine",
        })
    }
}

/// Một giá trị đo đã chuẩn hoá. Bất biến sau khi tạo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub metric: Metric,
    pub value: f64,
    pub unit: Option<String>,
    pub effective: DateTime<Utc>,
}

/// Một bản ghi truyền thuốc vận mạch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InfusionReading {
    pub drug: Drug,
    pub rate: Option<f64>,
    pub unit: Option<String>,
    pub effective: DateTime<Utc>,
}

/// Sáu hệ cơ quan của thang điểm SOFA.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrganSystem {
    Resp,
    Coag,
    Liver,
    Cardio,
    #[serde(rename = "CNS")]
    Cns,
    Renal,
}

impl OrganSystem {
    pub const ALL: [OrganSystem; 6] = [
        OrganSystem::Resp,
        OrganSystem::Coag,
        OrganSystem::Liver,
        OrganSystem::Cardio,
        OrganSystem::Cns,
        OrganSystem::Renal,
    ];
}

impl fmt::Display for OrganSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrganSystem::Resp => "Resp",
            OrganSystem::Coag => "Coag",
            OrganSystem::Liver => "Liver",
            OrganSystem::Cardio => "Cardio",
            OrganSystem::Cns => "CNS",
            OrganSystem::Renal => "Renal",
        })
    }
}

/// Điểm thành phần tại một thời điểm; `None` nghĩa là không xác định.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SubScores {
    pub resp: Option<u8>,
    pub coag: Option<u8>,
    pub liver: Option<u8>,
    pub cardio: Option<u8>,
    pub cns: Option<u8>,
    pub renal: Option<u8>,
}

impl SubScores {
    pub fn get(&self, system: OrganSystem) -> Option<u8> {
        match system {
            OrganSystem::Resp => self.resp,
            OrganSystem::Coag => self.coag,
            OrganSystem::Liver => self.liver,
            OrganSystem::Cardio => self.cardio,
            OrganSystem::Cns => self.cns,
            OrganSystem::Renal => self.renal,
        }
    }

    /// Các hệ cơ quan chưa xác định được điểm, theo thứ tự cố định.
    pub fn missing(&self) -> Vec<OrganSystem> {
        OrganSystem::ALL
            .into_iter()
            .filter(|system| self.get(*system).is_none())
            .collect()
    }

    /// Tổng điểm, chỉ có khi đủ cả sáu thành phần.
    pub fn total(&self) -> Option<u8> {
        OrganSystem::ALL
            .into_iter()
            .map(|system| self.get(system))
            .sum()
    }
}

/// Một dòng kết quả SOFA hoàn chỉnh.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredRow {
    pub patient_id: String,
    #[serde(
        rename = "sofa_score_datetime",
        serialize_with = "serialize_instant"
    )]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sofa_score")]
    pub total_score: u8,
    #[serde(skip)]
    pub sub_scores: SubScores,
}

impl ScoredRow {
    /// Chỉ tạo được dòng khi đủ sáu điểm thành phần; tổng luôn là phép cộng.
    pub fn from_sub_scores(
        patient_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        sub_scores: SubScores,
    ) -> Option<Self> {
        let total_score = sub_scores.total()?;
        Some(Self {
            patient_id: patient_id.into(),
            timestamp,
            total_score,
            sub_scores,
        })
    }
}

fn serialize_instant<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&units::format_instant(*value))
}

/// Ghi nhận thời điểm thiếu nhiều thành phần (không phải lỗi).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MissingDiagnostic {
    #[serde(serialize_with = "serialize_instant")]
    pub timestamp: DateTime<Utc>,
    pub missing: Vec<OrganSystem>,
}

/// Kết quả tính cho một bệnh nhân.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct PatientScores {
    pub patient_id: String,
    pub rows: Vec<ScoredRow>,
    pub diagnostics: Vec<MissingDiagnostic>,
}

impl PatientScores {
    pub fn empty(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            ..Self::default()
        }
    }
}

/// Lỗi chung khi tính điểm.
#[derive(Debug, thiserror::Error)]
pub enum SofaError {
    #[error("Cấu hình không hợp lệ: {0}")]
    InvalidConfig(String),
    #[error("Dữ liệu đầu vào thiếu thông tin tối thiểu")]
    MissingData,
    #[error("Không đọc được dữ liệu: {0}")]
    Parse(String),
}
