//! Read-side responses for the dashboard endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    #[serde(rename = "ascenseurs")]
    pub equipment: u64,
    #[serde(rename = "pannes_total")]
    pub breakdowns: u64,
    #[serde(rename = "pannes_30j")]
    pub breakdowns_30d: u64,
    #[serde(rename = "arrets")]
    pub stoppages: u64,
    #[serde(rename = "secteurs")]
    pub sectors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRunSummary {
    pub date: Option<Value>,
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    pub status: Option<Value>,
    pub duration: Option<Value>,
    #[serde(rename = "equipements")]
    pub equipment: Value,
    #[serde(rename = "pannes")]
    pub breakdowns: Value,
    #[serde(rename = "arrets")]
    pub stoppages: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub totals: FleetTotals,
    #[serde(rename = "arrets_en_cours")]
    pub current_stoppages: Vec<Value>,
    pub last_sync: Option<LastRunSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunsByKind {
    pub cron: usize,
    pub full: usize,
    pub other: usize,
}

/// Aggregate over the most recent run log rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub total_syncs: usize,
    pub success: usize,
    pub partial: usize,
    pub errors: usize,
    /// Percentage, one decimal.
    pub success_rate: f64,
    pub by_type: RunsByKind,
    pub avg_duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogStatsResponse {
    pub stats: LogStats,
    pub recent_logs: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
