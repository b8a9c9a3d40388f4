//! Cấu hình chấm điểm.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::SofaError;

/// Cửa sổ dài nhất được chấp nhận: 5 năm.
pub const MAX_WINDOW_HOURS: u32 = 5 * 365 * 24;

/// Độ dài cửa sổ nhìn lại cho mỗi chỉ số.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum WindowMode {
    /// 6 giờ, theo quy định lâm sàng.
    #[default]
    Strict,
    /// 24 giờ, chế độ demo nới lỏng.
    Demo,
    Custom { hours: u32 },
}

impl WindowMode {
    pub fn hours(self) -> u32 {
        match self {
            WindowMode::Strict => 6,
            WindowMode::Demo => 24,
            WindowMode::Custom { hours } => hours,
        }
    }
}

/// Cấu hình điều chỉnh cửa sổ thời gian và các giá trị mặc định.
///
/// Trường bị thiếu khi đọc JSON sẽ lấy giá trị mặc định.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringConfig {
    pub window: WindowMode,
    /// FiO2 (phân số) khi không có quan sát trong cửa sổ; 0.21 là khí trời.
    pub default_fio2: f64,
    /// Chỉ tốc độ truyền có đơn vị chứa một trong các chuỗi này mới được tính.
    pub pressor_rate_units: Vec<String>,
    /// Bật nhận diện hỗ trợ hô hấp từ văn bản quan sát.
    pub detect_respiratory_support: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            window: WindowMode::Strict,
            default_fio2: 0.21,
            pressor_rate_units: vec!["ug/kg/min".to_string(), "mcg/kg/min".to_string()],
            detect_respiratory_support: false,
        }
    }
}

impl ScoringConfig {
    pub fn demo() -> Self {
        Self {
            window: WindowMode::Demo,
            ..Self::default()
        }
    }

    pub fn window_hours(&self) -> u32 {
        self.window.hours()
    }

    pub fn look_back(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours()))
    }

    /// Kiểm tra cấu hình; lỗi ở đây là lỗi nghiêm trọng duy nhất của engine.
    pub fn validate(&self) -> Result<(), SofaError> {
        let hours = self.window_hours();
        if hours == 0 {
            return Err(SofaError::InvalidConfig(
                "cửa sổ nhìn lại phải lớn hơn 0 giờ".to_string(),
            ));
        }
        if hours > MAX_WINDOW_HOURS {
            return Err(SofaError::InvalidConfig(format!(
                "cửa sổ nhìn lại {hours} giờ vượt quá giới hạn {MAX_WINDOW_HOURS} giờ"
            )));
        }
        if !(self.default_fio2 > 0.0 && self.default_fio2 <= 1.0) {
            return Err(SofaError::InvalidConfig(format!(
                "FiO2 mặc định phải là phân số trong (0, 1], nhận được {}",
                self.default_fio2
            )));
        }
        if self.pressor_rate_units.iter().all(|unit| unit.trim().is_empty()) {
            return Err(SofaError::InvalidConfig(
                "cần ít nhất một đơn vị tốc độ truyền vận mạch".to_string(),
            ));
        }
        Ok(())
    }

    /// Đơn vị tốc độ truyền có được chấp nhận là liều theo cân nặng mỗi phút không.
    pub fn accepts_rate_unit(&self, unit: Option<&str>) -> bool {
        let Some(unit) = unit else {
            return false;
        };
        let lower = unit.to_lowercase();
        self.pressor_rate_units
            .iter()
            .filter(|accepted| !accepted.trim().is_empty())
            .any(|accepted| lower.contains(&accepted.to_lowercase()))
    }
}
