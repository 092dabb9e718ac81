use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parsers::{RawRecord, fields};

/// Row of `parc_arrets`, one per equipment unit out of service right now.
///
/// The table is a snapshot: it is emptied and refilled on every stoppage sync, so
/// `equipment_id` is a soft reference, not a durable key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppageRow {
    #[serde(rename = "id_wsoucont")]
    pub equipment_id: i64,
    #[serde(rename = "id_panne")]
    pub breakdown_id: Option<i64>,
    #[serde(rename = "code_appareil")]
    pub device_code: Option<String>,
    #[serde(rename = "adresse")]
    pub address: Option<String>,
    #[serde(rename = "ville")]
    pub city: Option<String>,
    #[serde(rename = "secteur")]
    pub sector: Option<i64>,
    #[serde(rename = "date_appel")]
    pub call_date: Option<String>,
    #[serde(rename = "heure_appel")]
    pub call_time: Option<String>,
    #[serde(rename = "motif")]
    pub reason: Option<String>,
    #[serde(rename = "demandeur")]
    pub requester: Option<String>,
    pub synced_at: DateTime<Utc>,
}

impl StoppageRow {
    pub fn from_record(record: &RawRecord, now: DateTime<Utc>) -> Option<Self> {
        let equipment_id = fields::key(record.get("nIDSOUCONT"))?;

        Some(Self {
            equipment_id,
            breakdown_id: fields::integer(record.get("nClepanne")),
            device_code: fields::string(record.get("sAscenseur"), 50),
            address: fields::string(record.get("sAdresse"), 200),
            city: fields::string(record.get("sVille"), 200),
            sector: fields::integer(record.get("nSecteur")),
            call_date: fields::date(record.get("sDateAppel")),
            call_time: fields::time(record.get("sHeureAppel")),
            reason: fields::string(record.get("sMotifAppel"), 500),
            requester: fields::string(record.get("sDemandeur"), 100),
            synced_at: now,
        })
    }
}
