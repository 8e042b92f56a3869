use crate::types::{AttendanceRecord, Method, Status};
use serde::Serialize;

/// Per-method record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MethodCounts {
    pub face: usize,
    pub fingerprint: usize,
    pub motion: usize,
}

impl MethodCounts {
    pub fn get(&self, method: Method) -> usize {
        match method {
            Method::Face => self.face,
            Method::Fingerprint => self.fingerprint,
            Method::Motion => self.motion,
        }
    }
}

/// Aggregate view over a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total: usize,
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    pub by_method: MethodCounts,
    /// Mean confidence in percent; `None` for an empty set.
    pub average_confidence: Option<f64>,
}

impl AttendanceSummary {
    pub fn from_records(records: &[AttendanceRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        let mut confidence_sum = 0.0;

        for r in records {
            match r.status {
                Status::Present => summary.present += 1,
                Status::Late => summary.late += 1,
                Status::Absent => summary.absent += 1,
            }
            match r.method {
                Method::Face => summary.by_method.face += 1,
                Method::Fingerprint => summary.by_method.fingerprint += 1,
                Method::Motion => summary.by_method.motion += 1,
            }
            confidence_sum += r.confidence;
        }

        if !records.is_empty() {
            summary.average_confidence = Some(confidence_sum / records.len() as f64);
        }
        summary
    }

    /// Present or late, as a percentage of all records.
    pub fn attendance_rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.present + self.late) as f64 * 100.0 / self.total as f64)
    }
}
