use serde::{Deserialize, Serialize};

use crate::parsers::{RawRecord, fields};

/// Row of `parc_type_planning`: how many maintenance visits a planning code implies per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningTypeRow {
    #[serde(rename = "id_wtypepla")]
    pub upstream_id: Option<i64>,
    pub code: String,
    #[serde(rename = "nb_visites")]
    pub annual_visits: Option<i64>,
    #[serde(rename = "libelle")]
    pub label: Option<String>,
}

impl PlanningTypeRow {
    /// `None` when the record has no code. Field names vary in case between feed versions.
    pub fn from_record(record: &RawRecord) -> Option<Self> {
        let code = fields::string(record.first_of(&["TYPEPLANNING", "typeplanning"]), 50)?;

        Some(Self {
            upstream_id: fields::integer(record.first_of(&["IDWTYPEPLA", "idwtypepla"])),
            code,
            annual_visits: fields::integer(record.first_of(&["NB_VISITES", "nb_visites"])),
            label: fields::string(record.first_of(&["LIBELLEPLAN", "libelleplan"]), 200),
        })
    }
}
