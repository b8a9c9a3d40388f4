//! Phân tích thời điểm và chuẩn hoá đơn vị sinh lý.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const ISO_Z_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const PERCENT_UNITS: [&str; 3] = ["%", "percent", "perc"];

/// Phân tích chuỗi thời gian ISO-8601 về UTC.
///
/// Chuỗi kết thúc bằng `Z` được đọc là UTC, còn lại đọc kèm độ lệch múi giờ.
/// Nhánh dự phòng chấp nhận dấu cách thay cho `T`, ngày giờ không múi giờ
/// (coi là UTC) và ngày trơn. Trả về `None` nếu không khớp dạng nào.
pub fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.ends_with('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, ISO_Z_FORMAT) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    parse_instant_lenient(text)
}

fn parse_instant_lenient(text: &str) -> Option<DateTime<Utc>> {
    let normalized = text.replacen(' ', "T", 1);

    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = normalized.trim_end_matches('Z');
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Định dạng thời điểm theo UTC, chính xác đến giây, có hậu tố `Z`.
pub fn format_instant(value: DateTime<Utc>) -> String {
    value.format(ISO_Z_FORMAT).to_string()
}

/// Đưa FiO2 về dạng phân số.
///
/// Đơn vị phần trăm thì chia 100. Không có đơn vị thì giá trị trên 1.5 cũng
/// coi là phần trăm: 1.2 giữ nguyên, 1.6 thành 0.016.
pub fn normalize_fio2(value: Option<f64>, unit: Option<&str>) -> Option<f64> {
    let value = value?;

    if let Some(unit) = unit {
        let unit = unit.trim().to_lowercase();
        if PERCENT_UNITS.contains(&unit.as_str()) {
            return Some(value / 100.0);
        }
    }

    if value > 1.5 {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}
