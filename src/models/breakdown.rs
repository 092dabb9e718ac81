use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parsers::{RawRecord, fields};

pub const KEY_COLUMN: &str = "id_panne";

/// Which field layout a `get_Synchro_Wpanne` record is read with.
///
/// The full sync and the fast path have always mapped the same feed differently (ticket key,
/// address, motive, category and call-date fields). Until upstream documents a single layout both
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownShape {
    /// Keyed by `IDWPANNE`.
    FullSync,
    /// Keyed by `P0CLEUNIK`.
    FastPath,
}

impl BreakdownShape {
    pub fn key_field(self) -> &'static str {
        match self {
            Self::FullSync => "IDWPANNE",
            Self::FastPath => "P0CLEUNIK",
        }
    }
}

/// Row of `parc_pannes`, keyed by the upstream ticket id across all periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownRow {
    #[serde(rename = "id_panne")]
    pub ticket_id: i64,
    #[serde(rename = "id_wsoucont")]
    pub equipment_id: Option<i64>,
    #[serde(rename = "code_appareil")]
    pub device_code: Option<String>,
    #[serde(rename = "adresse")]
    pub address: Option<String>,
    #[serde(rename = "code_postal")]
    pub postal_code: Option<String>,
    #[serde(rename = "date_appel")]
    pub call_date: Option<String>,
    #[serde(rename = "heure_appel")]
    pub call_time: Option<String>,
    #[serde(rename = "date_arrivee")]
    pub arrival_date: Option<String>,
    #[serde(rename = "heure_arrivee")]
    pub arrival_time: Option<String>,
    #[serde(rename = "date_depart")]
    pub departure_date: Option<String>,
    #[serde(rename = "heure_depart")]
    pub departure_time: Option<String>,
    #[serde(rename = "motif")]
    pub reason: Option<String>,
    pub cause: Option<String>,
    #[serde(rename = "travaux")]
    pub work_performed: Option<String>,
    #[serde(rename = "depanneur")]
    pub technician: Option<String>,
    #[serde(rename = "duree_minutes")]
    pub duration_minutes: Option<i64>,
    #[serde(rename = "type_panne")]
    pub category: Option<String>,
    #[serde(rename = "etat")]
    pub state: Option<String>,
    #[serde(rename = "demandeur")]
    pub requester: Option<String>,
    #[serde(rename = "personnes_bloquees")]
    pub people_trapped: i64,
    #[serde(rename = "data_wpanne")]
    pub raw: serde_json::Value,
    pub synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BreakdownRow {
    /// `None` when the record carries no ticket id for `shape`.
    pub fn from_record(record: &RawRecord, shape: BreakdownShape, now: DateTime<Utc>) -> Option<Self> {
        let ticket_id = fields::key(record.get(shape.key_field()))?;

        let (address, call_date, reason, category, duration) = match shape {
            BreakdownShape::FullSync => (
                record.get("ADRES"),
                record.get("DATEAPP"),
                record.get("MOTIF"),
                record.get("TYPEPANNE"),
                record.get("DUREE"),
            ),
            BreakdownShape::FastPath => (
                record.get("LOCAL_"),
                record.first_of(&["APPEL", "DATE"]),
                record.get("PANNES"),
                record.get("ENSEMBLE"),
                record.first_of(&["DUREE", "NOMBRE"]),
            ),
        };

        Some(Self {
            ticket_id,
            equipment_id: fields::integer(record.get("IDWSOUCONT")),
            device_code: fields::string(record.get("ASCENSEUR"), 50),
            address: fields::string(address, 200),
            postal_code: fields::string(record.get("NUM"), 10),
            call_date: fields::date(call_date),
            call_time: fields::time(record.get("HEUREAPP")),
            arrival_date: fields::date(record.get("DATEARR")),
            arrival_time: fields::time(record.get("HEUREARR")),
            departure_date: fields::date(record.get("DATEDEP")),
            departure_time: fields::time(record.get("HEUREDEP")),
            reason: fields::string(reason, 500),
            cause: fields::string(record.get("CAUSE"), 500),
            work_performed: fields::string(record.get("TRAVAUX"), 1000),
            technician: fields::string(record.get("DEPANNEUR"), 100),
            duration_minutes: fields::integer(duration),
            category: fields::string(category, 100),
            state: fields::string(record.get("ETAT"), 50),
            requester: fields::string(record.get("DEMANDEUR"), 100),
            people_trapped: fields::integer(record.get("PERSBLOQ")).unwrap_or(0),
            raw: record.to_json(),
            synced_at: now,
            updated_at: now,
        })
    }
}
