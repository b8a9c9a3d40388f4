//! Các hàm tính điểm thành phần theo hệ cơ quan.
//!
//! Mỗi hàm trả về mức 0..=4 hoặc `None`. Các khoảng giữ nguyên như bảng SOFA,
//! kể cả chỗ hở: giá trị rơi vào khe giữa hai khoảng (bilirubin 1.95, GCS
//! 14.5) là không xác định, không làm tròn sang khoảng bên cạnh.

use serde::{Deserialize, Serialize};

use crate::Drug;

/// Tốc độ truyền thuốc vận mạch tại một thời điểm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PressorRates {
    pub norepinephrine: Option<f64>,
    pub epinephrine: Option<f64>,
    pub dopamine: Option<f64>,
    pub dobutamine: Option<f64>,
}

impl PressorRates {
    pub fn is_empty(&self) -> bool {
        self.norepinephrine.is_none()
            && self.epinephrine.is_none()
            && self.dopamine.is_none()
            && self.dobutamine.is_none()
    }

    /// Ghi tốc độ; bản ghi sau của cùng thuốc thay thế bản ghi trước.
    pub fn set(&mut self, drug: Drug, rate: f64) {
        let slot = match drug {
            Drug::Norepinephrine => &mut self.norepinephrine,
            Drug::Epinephrine => &mut self.epinephrine,
            Drug::Dopamine => &mut self.dopamine,
            Drug::Dobutamine => &mut self.dobutamine,
        };
        *slot = Some(rate);
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Điểm hô hấp theo PaO2/FiO2, dự phòng bằng SpO2/FiO2.
///
/// Khoảng SF < 142 được xét trước và bao luôn khoảng < 67: mọi SF dưới 142
/// được 2 điểm, hoặc 3 khi có hỗ trợ hô hấp.
pub fn score_respiratory(pf: Option<f64>, sf: Option<f64>, on_support: bool) -> Option<u8> {
    if let Some(pf) = finite(pf) {
        return match pf {
            v if v >= 400.0 => Some(0),
            v if v >= 300.0 => Some(1),
            v if v >= 200.0 => Some(2),
            v if v >= 100.0 => Some(3),
            _ => Some(4),
        };
    }

    let sf = finite(sf)?;
    match sf {
        v if v > 302.0 => Some(0),
        v if (221.0..302.0).contains(&v) => Some(1),
        v if (142.0..221.0).contains(&v) => Some(2),
        v if v < 142.0 => Some(if on_support { 3 } else { 2 }),
        _ => None,
    }
}

/// Điểm đông máu theo tiểu cầu (10^3/uL).
pub fn score_coagulation(platelets: Option<f64>) -> Option<u8> {
    match finite(platelets)? {
        v if v >= 150.0 => Some(0),
        v if v >= 100.0 => Some(1),
        v if v >= 50.0 => Some(2),
        v if v >= 20.0 => Some(3),
        _ => Some(4),
    }
}

/// Điểm gan theo bilirubin (mg/dL).
pub fn score_liver(bilirubin: Option<f64>) -> Option<u8> {
    match finite(bilirubin)? {
        v if v < 1.2 => Some(0),
        v if (1.2..=1.9).contains(&v) => Some(1),
        v if (2.0..=5.9).contains(&v) => Some(2),
        v if (6.0..=11.9).contains(&v) => Some(3),
        v if v >= 12.0 => Some(4),
        _ => None,
    }
}

/// Điểm tim mạch: xét thuốc vận mạch trước, sau đó đến huyết áp trung bình.
///
/// Có dobutamine thì 2 điểm bất kể liều. Tốc độ không khớp khoảng nào
/// (dopamine giữa 5 và 5.1, norepinephrine bằng 0) thì quay về MAP.
pub fn score_cardiovascular(map: Option<f64>, pressors: &PressorRates) -> Option<u8> {
    if !pressors.is_empty() {
        if pressors.dobutamine.is_some() {
            return Some(2);
        }

        let dopamine = pressors.dopamine;
        let norepinephrine = pressors.norepinephrine;
        let epinephrine = pressors.epinephrine;

        let above = |rate: Option<f64>, limit: f64| rate.is_some_and(|r| r > limit);
        let low_dose = |rate: Option<f64>| rate.is_some_and(|r| r > 0.0 && r <= 0.1);

        if above(dopamine, 15.0) || above(norepinephrine, 0.1) || above(epinephrine, 0.1) {
            return Some(4);
        }
        if dopamine.is_some_and(|r| r > 5.1 && r <= 15.0)
            || low_dose(norepinephrine)
            || low_dose(epinephrine)
        {
            return Some(3);
        }
        if dopamine.is_some_and(|r| r < 5.0) {
            return Some(2);
        }
    }

    let map = finite(map)?;
    Some(if map >= 70.0 { 0 } else { 1 })
}

/// Điểm thần kinh theo tổng điểm Glasgow.
pub fn score_cns(gcs: Option<f64>) -> Option<u8> {
    match finite(gcs)? {
        v if v == 15.0 => Some(0),
        v if (13.0..=14.0).contains(&v) => Some(1),
        v if (10.0..=12.0).contains(&v) => Some(2),
        v if (6.0..=9.0).contains(&v) => Some(3),
        v if v < 6.0 => Some(4),
        _ => None,
    }
}

/// Điểm thận theo creatinine (mg/dL).
pub fn score_renal(creatinine: Option<f64>) -> Option<u8> {
    match finite(creatinine)? {
        v if v < 1.2 => Some(0),
        v if (1.2..=1.9).contains(&v) => Some(1),
        v if (2.0..=3.4).contains(&v) => Some(2),
        v if (3.5..=4.9).contains(&v) => Some(3),
        v if v >= 5.0 => Some(4),
        _ => None,
    }
}
