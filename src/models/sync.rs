//! Response bodies of the sync trigger endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    /// Some batches or rows failed to write; the rest went through.
    Partial,
    Error,
    /// Pagination index past the end; nothing was fetched.
    Done,
    Ready,
}

/// Counters filled by the derived pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedCounts {
    pub planning_codes: usize,
    pub equipment_with_planning: usize,
    pub visits_updated: usize,
    pub equipment_total: usize,
    pub stopped: usize,
    pub flags_changed: usize,
}

/// Outcome of one step invocation, including the hint for the next call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector_idx: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_idx: Option<usize>,
    /// Records returned by upstream.
    pub found: usize,
    pub written: usize,
    /// Records dropped for lacking their key.
    pub skipped: usize,
    /// Records in failed writes.
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedCounts>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Only the first few batch errors are echoed back.
pub const MAX_REPORTED_ERRORS: usize = 5;

impl StepReport {
    pub fn new(step: &str) -> Self {
        Self {
            status: StepStatus::Success,
            step: Some(step.to_string()),
            sector: None,
            sector_idx: None,
            period: None,
            period_idx: None,
            found: 0,
            written: 0,
            skipped: 0,
            failed: 0,
            stopped_ids: None,
            derived: None,
            errors: Vec::new(),
            message: None,
            next: None,
        }
    }

    pub fn error(step: &str, message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            message: Some(message.into()),
            ..Self::new(step)
        }
    }

    pub fn done(step: &str, message: &str, next: String) -> Self {
        Self {
            status: StepStatus::Done,
            message: Some(message.to_string()),
            next: Some(next),
            ..Self::new(step)
        }
    }

    /// Record a failed write of `rows` records; the step becomes partial.
    pub fn record_failure(&mut self, rows: usize, error: String) {
        self.failed += rows;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(error);
        }
        if self.status == StepStatus::Success {
            self.status = StepStatus::Partial;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastPathStats {
    pub stoppages: usize,
    pub breakdowns: usize,
    pub breakdowns_skipped: usize,
    pub flags_set: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastPathReport {
    pub status: StepStatus,
    pub mode: String,
    pub stats: FastPathStats,
    pub duration: f64,
    pub timestamp: DateTime<Utc>,
}
