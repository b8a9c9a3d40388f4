//! Chuỗi thời gian theo từng chỉ số và truy vấn trong cửa sổ nhìn lại.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::{Metric, Observation};

/// Một giá trị đo trong chuỗi.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
    pub unit: Option<String>,
}

/// Các giá trị đo đã sắp theo thời gian, nhóm theo chỉ số, chỉ đọc.
///
/// Các điểm cùng thời điểm giữ nguyên thứ tự thêm vào; truy vấn rơi vào
/// nhóm trùng sẽ trả về điểm được thêm đầu tiên.
#[derive(Debug, Clone, Default)]
pub struct MetricSeries {
    points: HashMap<Metric, Vec<SeriesPoint>>,
}

impl MetricSeries {
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut points: HashMap<Metric, Vec<SeriesPoint>> = HashMap::new();
        for observation in observations {
            points
                .entry(observation.metric)
                .or_default()
                .push(SeriesPoint {
                    at: observation.effective,
                    value: observation.value,
                    unit: observation.unit.clone(),
                });
        }
        for series in points.values_mut() {
            // sắp xếp ổn định: cùng thời điểm giữ thứ tự thêm vào
            series.sort_by_key(|point| point.at);
        }
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.values().all(Vec::is_empty)
    }

    pub fn points(&self, metric: Metric) -> &[SeriesPoint] {
        self.points.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Giá trị mới nhất trong `[t - window, t]`, `None` nếu cửa sổ trống.
    pub fn latest_within(&self, metric: Metric, t: DateTime<Utc>, window: Duration) -> Option<f64> {
        self.latest_point_within(metric, t, window)
            .map(|point| point.value)
    }

    /// Như [`latest_within`](Self::latest_within) nhưng trả về cả điểm đo.
    pub fn latest_point_within(
        &self,
        metric: Metric,
        t: DateTime<Utc>,
        window: Duration,
    ) -> Option<&SeriesPoint> {
        latest_within(self.points(metric), t, window)
    }

    /// Các thời điểm phân biệt của mọi chỉ số, đã sắp xếp.
    pub fn candidate_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points
            .values()
            .flatten()
            .map(|point| point.at)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Tìm điểm gần nhất trong cửa sổ trên một lát cắt đã sắp xếp.
///
/// Nếu `t - window` tràn phạm vi thời gian thì cửa sổ không có cận dưới.
pub fn latest_within(
    points: &[SeriesPoint],
    t: DateTime<Utc>,
    window: Duration,
) -> Option<&SeriesPoint> {
    let end = points.partition_point(|point| point.at <= t);
    let last = points[..end].last()?;
    if let Some(start) = t.checked_sub_signed(window) {
        if last.at < start {
            return None;
        }
    }
    let first_of_tie = points[..end].partition_point(|point| point.at < last.at);
    points.get(first_of_tie)
}
