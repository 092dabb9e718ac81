use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of the error text kept on a run log row.
pub const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Fast path: stoppages, recent breakdowns, flag reconciliation.
    Cron,
    /// Terminal step of the full sync.
    Full,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Success,
    Partial,
    Error,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }
}

/// Row of `parc_sync_logs`. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub sync_date: DateTime<Utc>,
    pub sync_type: RunKind,
    pub status: RunOutcome,
    #[serde(rename = "equipements_count")]
    pub equipment_count: i64,
    #[serde(rename = "pannes_count")]
    pub breakdown_count: i64,
    #[serde(rename = "arrets_count")]
    pub stoppage_count: i64,
    pub duration_seconds: f64,
    #[serde(rename = "error_message")]
    pub error: Option<String>,
}
