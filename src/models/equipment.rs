use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parsers::{RawRecord, fields};

pub const KEY_COLUMN: &str = "id_wsoucont";
pub const ANNUAL_VISITS_COLUMN: &str = "nb_visites_an";
pub const STOPPED_COLUMN: &str = "en_arret";
pub const PLANNING_TYPE_COLUMN: &str = "type_planning";

/// Core columns of `parc_ascenseurs` written by the per-sector equipment sync.
///
/// Derived columns (`nb_visites_an`, `en_arret`) and visit dates are deliberately absent so the
/// merge-upsert never resets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentRow {
    #[serde(rename = "id_wsoucont")]
    pub equipment_id: i64,
    #[serde(rename = "id_wcontrat")]
    pub contract_id: Option<i64>,
    #[serde(rename = "secteur")]
    pub sector: Option<i64>,
    #[serde(rename = "code_appareil")]
    pub device_code: Option<String>,
    #[serde(rename = "indice")]
    pub index: Option<i64>,
    #[serde(rename = "adresse")]
    pub address: Option<String>,
    #[serde(rename = "ville")]
    pub city: Option<String>,
    #[serde(rename = "code_postal")]
    pub postal_code: Option<String>,
    #[serde(rename = "localisation")]
    pub location: Option<String>,
    #[serde(rename = "nom_convivial")]
    pub display_name: Option<String>,
    pub client_ref: Option<String>,
    pub client_ref2: Option<String>,
    pub client_ref3: Option<String>,
    #[serde(rename = "num_appareil_client")]
    pub client_device_number: Option<String>,
    #[serde(rename = "genre")]
    pub kind: Option<i64>,
    #[serde(rename = "type_appareil")]
    pub device_type: Option<String>,
    #[serde(rename = "marque")]
    pub make: Option<String>,
    #[serde(rename = "modele")]
    pub model: Option<String>,
    #[serde(rename = "num_serie")]
    pub serial_number: Option<String>,
    #[serde(rename = "tel_cabine")]
    pub cabin_phone: Option<String>,
    #[serde(rename = "type_depannage")]
    pub repair_type: Option<i64>,
    #[serde(rename = "securite")]
    pub safety: Option<i64>,
    #[serde(rename = "securite2")]
    pub safety2: Option<i64>,
    #[serde(rename = "type_planning")]
    pub planning_type: Option<String>,
    #[serde(flatten)]
    pub planning: MonthlyPlanning,
    #[serde(rename = "data_wsoucont")]
    pub raw: serde_json::Value,
    pub synced_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One flag per month in which a maintenance visit is planned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPlanning {
    pub planning_jan: bool,
    pub planning_fev: bool,
    pub planning_mar: bool,
    pub planning_avr: bool,
    pub planning_mai: bool,
    pub planning_jun: bool,
    pub planning_jul: bool,
    pub planning_aou: bool,
    pub planning_sep: bool,
    pub planning_oct: bool,
    pub planning_nov: bool,
    pub planning_dec: bool,
}

impl MonthlyPlanning {
    fn from_record(record: &RawRecord) -> Self {
        let month = |field: &str| fields::flag(record.get(field));
        Self {
            planning_jan: month("JAN"),
            planning_fev: month("FEV"),
            planning_mar: month("MAR"),
            planning_avr: month("AVR"),
            planning_mai: month("MAI"),
            planning_jun: month("JUI"),
            planning_jul: month("JUL"),
            planning_aou: month("AOU"),
            planning_sep: month("SEP"),
            planning_oct: month("OCT"),
            planning_nov: month("NOV"),
            planning_dec: month("DEC"),
        }
    }
}

impl EquipmentRow {
    pub fn from_record(record: &RawRecord, now: DateTime<Utc>) -> Option<Self> {
        let equipment_id = fields::key(record.get("IDWSOUCONT"))?;
        let city_line = record.get("DES3");

        Some(Self {
            equipment_id,
            contract_id: fields::integer(record.get("IDWCONTRAT")),
            sector: fields::integer(record.get("SECTEUR")),
            device_code: fields::string(record.get("ASCENSEUR"), 50),
            index: fields::integer(record.get("INDICE")),
            address: fields::string(record.get("DES2"), 200),
            city: fields::string(city_line, 200),
            // The city line starts with the postal code.
            postal_code: fields::string(city_line, 5),
            location: fields::string(record.get("LOCALISATION"), 200),
            display_name: fields::string(record.get("NOM_CONVIVIAL"), 100),
            client_ref: fields::string(record.get("REFCLI"), 100),
            client_ref2: fields::string(record.get("REFCLI2"), 100),
            client_ref3: fields::string(record.get("REFCLI3"), 100),
            client_device_number: fields::string(record.get("NUMAPPCLI"), 50),
            kind: fields::integer(record.get("GENRE")),
            device_type: fields::string(record.get("TYPE"), 50),
            make: fields::string(record.get("DIV1"), 100),
            model: fields::string(record.get("DIV2"), 100),
            serial_number: fields::string(record.get("DIV7"), 100),
            cabin_phone: fields::string(record.get("TELCABINE"), 50),
            repair_type: fields::integer(record.get("IDTYPE_DEPANNAGE")),
            safety: fields::integer(record.get("SECURITE")),
            safety2: fields::integer(record.get("SECURITE2")),
            planning_type: fields::string(record.get("TYPEPLANNING"), 50),
            planning: MonthlyPlanning::from_record(record),
            raw: record.to_json(),
            synced_at: now,
            updated_at: now,
        })
    }
}

/// Visit-date columns of `parc_ascenseurs` patched by the supplemental sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitDatesPatch {
    pub passage_1: Option<String>,
    pub passage_2: Option<String>,
    pub passage_3: Option<String>,
    pub passage_4: Option<String>,
    pub passage_5: Option<String>,
    /// Upstream lists the most recent visit first.
    #[serde(rename = "dernier_passage")]
    pub last_visit: Option<String>,
    #[serde(rename = "data_wsoucont2")]
    pub raw: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl VisitDatesPatch {
    /// Returns the equipment key together with the patch.
    pub fn from_record(record: &RawRecord, now: DateTime<Utc>) -> Option<(i64, Self)> {
        let equipment_id = fields::key(record.get("IDWSOUCONT"))?;
        let visit = |field: &str| record.get(field).and_then(fields::compact_date);

        Some((
            equipment_id,
            Self {
                passage_1: visit("DATEPASS1"),
                passage_2: visit("DATEPASS2"),
                passage_3: visit("DATEPASS3"),
                passage_4: visit("DATEPASS4"),
                passage_5: visit("DATEPASS5"),
                last_visit: visit("DATEPASS1"),
                raw: record.to_json(),
                updated_at: now,
            },
        ))
    }
}
