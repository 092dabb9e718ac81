mod common;

use serde_json::{Value, json};
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use progilift_sync::{
    jobs::{self, SECTORS, Step},
    models::sync::StepStatus,
    services::{
        memory_store::MemoryStore,
        progilift::{ProgiliftClient, methods},
        record_store::tables,
    },
};

use crate::common::{FakeUpstream, borrowed, row, soap_response, stoppage};

fn equipment_response(ids: &[&str]) -> String {
    let records: Vec<Vec<(&str, &str)>> = ids
        .iter()
        .map(|id| {
            vec![
                ("IDWSOUCONT", *id),
                ("SECTEUR", "3"),
                ("ASCENSEUR", "ASC"),
                ("DES2", "12 rue Blatin"),
                ("DES3", "63000 CLERMONT-FERRAND"),
                ("TYPEPLANNING", "P9"),
                ("JAN", "1"),
            ]
        })
        .collect();
    soap_response(methods::EQUIPMENT, "tabListeWsoucont", &records)
}

fn stoppage_response(ids: &[&str]) -> String {
    let records: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| stoppage(id, &(900 + i).to_string()))
        .collect();
    soap_response(methods::STOPPAGES, "tabListeArrets", &borrowed(&records))
}

fn breakdown_response(count: usize) -> String {
    let ids: Vec<String> = (1..=count).map(|i| i.to_string()).collect();
    let records: Vec<Vec<(&str, &str)>> = ids
        .iter()
        .map(|id| {
            vec![
                ("IDWPANNE", id.as_str()),
                ("IDWSOUCONT", "1042"),
                ("ADRES", "12 rue Blatin"),
                ("DATEAPP", "20241225"),
                ("HEUREAPP", "14:30"),
                ("MOTIF", "Porte bloquee"),
            ]
        })
        .collect();
    soap_response(methods::BREAKDOWNS, "tabListeWpanne", &records)
}

fn ids_in(store: &MemoryStore, table: &str, column: &str) -> Vec<i64> {
    let mut ids: Vec<i64> = store
        .rows(table)
        .iter()
        .filter_map(|r| r.get(column).and_then(Value::as_i64))
        .collect();
    ids.sort();
    ids
}

/// Running the same sector twice upserts instead of duplicating.
#[tokio::test]
async fn test_equipment_sync_is_idempotent() {
    let upstream = FakeUpstream::new();
    upstream.respond(methods::EQUIPMENT, equipment_response(&["1", "2", "3"]));
    let store = MemoryStore::new();

    let first = jobs::run_step(&upstream, &store, Step::Equipment { sector: 2 }).await;
    let after_first = store.rows(tables::EQUIPMENT);
    let second = jobs::run_step(&upstream, &store, Step::Equipment { sector: 2 }).await;
    let after_second = store.rows(tables::EQUIPMENT);

    assert_eq!(first.status, StepStatus::Success);
    assert_eq!(second.status, StepStatus::Success);
    assert_eq!(second.written, 3);
    assert_eq!(after_second.len(), 3);
    for (a, b) in after_first.iter().zip(after_second.iter()) {
        assert_eq!(a["id_wsoucont"], b["id_wsoucont"]);
        assert_eq!(a["adresse"], b["adresse"]);
        assert_eq!(a["code_postal"], "63000");
    }

    let call = &upstream.calls_to(methods::EQUIPMENT)[0];
    assert_eq!(call.param("sListeSecteursTechnicien"), Some(SECTORS[2]));
    assert_eq!(second.next.as_deref(), Some("?step=2&sector=3"));
}

#[tokio::test]
async fn test_equipment_sync_keeps_derived_columns() {
    let upstream = FakeUpstream::new();
    upstream.respond(methods::EQUIPMENT, equipment_response(&["1"]));
    let store = MemoryStore::new();
    store.seed(
        tables::EQUIPMENT,
        vec![row(json!({"id_wsoucont": 1, "en_arret": true, "nb_visites_an": 9}))],
    );

    jobs::run_step(&upstream, &store, Step::Equipment { sector: 0 }).await;

    let rows = store.rows(tables::EQUIPMENT);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["en_arret"], true);
    assert_eq!(rows[0]["nb_visites_an"], 9);
    assert_eq!(rows[0]["type_planning"], "P9");
}

/// A second stoppage run leaves exactly the second set.
#[tokio::test]
async fn test_stoppage_snapshot_is_replaced() {
    let upstream = FakeUpstream::new();
    upstream
        .respond(methods::STOPPAGES, stoppage_response(&["10", "11"]))
        .respond(methods::STOPPAGES, stoppage_response(&["12"]));
    let store = MemoryStore::new();

    let first = jobs::run_step(&upstream, &store, Step::Stoppages).await;
    assert_eq!(first.stopped_ids, Some(vec![10, 11]));
    assert_eq!(ids_in(&store, tables::STOPPAGES, "id_wsoucont"), vec![10, 11]);

    let second = jobs::run_step(&upstream, &store, Step::Stoppages).await;
    assert_eq!(second.status, StepStatus::Success);
    assert_eq!(second.stopped_ids, Some(vec![12]));
    assert_eq!(second.next.as_deref(), Some("?step=2&sector=0"));
    assert_eq!(ids_in(&store, tables::STOPPAGES, "id_wsoucont"), vec![12]);

    let stored = &store.rows(tables::STOPPAGES)[0];
    assert_eq!(stored["date_appel"], "2024-12-25");
    assert_eq!(stored["heure_appel"], "09:05:00");
}

/// Upstream writes `0` for an unset equipment id; such stoppages are skipped.
#[tokio::test]
async fn test_stoppage_with_zero_equipment_id_is_skipped() {
    let upstream = FakeUpstream::new();
    upstream.respond(methods::STOPPAGES, stoppage_response(&["0", "14"]));
    let store = MemoryStore::new();

    let report = jobs::run_step(&upstream, &store, Step::Stoppages).await;

    assert_eq!(report.status, StepStatus::Success);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.stopped_ids, Some(vec![14]));
    assert_eq!(ids_in(&store, tables::STOPPAGES, "id_wsoucont"), vec![14]);
}

#[tokio::test]
async fn test_failed_stoppage_fetch_keeps_previous_snapshot() {
    let upstream = FakeUpstream::new();
    upstream.fail(methods::STOPPAGES, "timed out after 30s");
    let store = MemoryStore::new();
    store.seed(tables::STOPPAGES, vec![row(json!({"id_wsoucont": 10}))]);

    let report = jobs::run_step(&upstream, &store, Step::Stoppages).await;

    assert_eq!(report.status, StepStatus::Error);
    assert!(report.next.is_none());
    assert_eq!(ids_in(&store, tables::STOPPAGES, "id_wsoucont"), vec![10]);
}

/// A fault envelope from the real client is a failed fetch, not an empty stoppage list.
#[tokio::test]
async fn test_soap_fault_keeps_previous_stoppage_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", "\"urn:WS_Progilift/IdentificationTechnicien\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<SOAP-ENV:Envelope><SOAP-ENV:Header><ns1:WSID xsi:type="xsd:hexBinary">0a1b2c3d</ns1:WSID></SOAP-ENV:Header><SOAP-ENV:Body/></SOAP-ENV:Envelope>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", "\"urn:WS_Progilift/get_AppareilsArret\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
            "<SOAP-ENV:Envelope><SOAP-ENV:Body><SOAP-ENV:Fault>",
            "<faultcode>SOAP-ENV:Server</faultcode><faultstring>Session expired</faultstring>",
            "</SOAP-ENV:Fault></SOAP-ENV:Body></SOAP-ENV:Envelope>"
        )))
        .mount(&server)
        .await;

    let client = ProgiliftClient::new(server.uri(), "AUVNB1".to_string());
    let store = MemoryStore::new();
    store.seed(tables::STOPPAGES, vec![row(json!({"id_wsoucont": 10}))]);

    let report = jobs::run_step(&client, &store, Step::Stoppages).await;

    assert_eq!(report.status, StepStatus::Error);
    assert!(report.next.is_none());
    assert_eq!(ids_in(&store, tables::STOPPAGES, "id_wsoucont"), vec![10]);
}

/// Breakdown records without a ticket id are counted, never written.
#[tokio::test]
async fn test_breakdowns_without_key_are_skipped() {
    let upstream = FakeUpstream::new();
    let records = vec![
        vec![("IDWPANNE", "501"), ("DATEAPP", "25/12/2024")],
        vec![("IDWPANNE", ""), ("DATEAPP", "26/12/2024")],
        vec![("MOTIF", "no key at all")],
        vec![("IDWPANNE", "502"), ("DATEAPP", "bad")],
    ];
    upstream.respond(
        methods::BREAKDOWNS,
        soap_response(methods::BREAKDOWNS, "tabListeWpanne", &records),
    );
    let store = MemoryStore::new();

    let report = jobs::run_step(&upstream, &store, Step::Breakdowns { period: 0 }).await;

    assert_eq!(report.status, StepStatus::Success);
    assert_eq!(report.found, 4);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.written, 2);
    assert_eq!(ids_in(&store, tables::BREAKDOWNS, "id_panne"), vec![501, 502]);
    assert!(store.rows(tables::BREAKDOWNS).iter().all(|r| !r["id_panne"].is_null()));

    let stored = store.rows(tables::BREAKDOWNS);
    assert_eq!(stored[0]["date_appel"], "2024-12-25");
    assert_eq!(stored[1]["date_appel"], Value::Null);
    assert_eq!(stored[0]["personnes_bloquees"], 0);
}

/// One rejected batch does not stop the others.
#[tokio::test]
async fn test_partial_breakdown_batch_failure() {
    let upstream = FakeUpstream::new();
    upstream.respond(methods::BREAKDOWNS, breakdown_response(250));
    let store = MemoryStore::new();
    store.fail_write(tables::BREAKDOWNS, 1);

    let report = jobs::run_step(&upstream, &store, Step::Breakdowns { period: 3 }).await;

    assert_eq!(report.status, StepStatus::Partial);
    assert_eq!(report.found, 250);
    assert_eq!(report.written, 150);
    assert_eq!(report.failed, 100);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Batch 1:"));
    assert_eq!(report.next.as_deref(), Some("?step=3&period=4"));

    let ids = ids_in(&store, tables::BREAKDOWNS, "id_panne");
    assert_eq!(ids.len(), 150);
    assert_eq!(ids.first(), Some(&1));
    assert_eq!(ids.last(), Some(&250));
    assert!(!ids.contains(&150));
}

/// A failed fetch leaves the period for a retry instead of pointing past it.
#[tokio::test]
async fn test_failed_breakdown_fetch_has_no_next_period() {
    let upstream = FakeUpstream::new();
    upstream.fail(methods::BREAKDOWNS, "HTTP 502 Bad Gateway");
    let store = MemoryStore::new();

    let report = jobs::run_step(&upstream, &store, Step::Breakdowns { period: 2 }).await;

    assert_eq!(report.status, StepStatus::Error);
    assert!(report.next.is_none());
    assert_eq!(report.period_idx, Some(2));
    assert!(store.rows(tables::BREAKDOWNS).is_empty());
}

#[tokio::test]
async fn test_pagination_past_the_end_makes_no_upstream_call() {
    let upstream = FakeUpstream::new();
    let store = MemoryStore::new();

    let equipment = jobs::run_step(&upstream, &store, Step::Equipment { sector: SECTORS.len() }).await;
    assert_eq!(equipment.status, StepStatus::Done);
    assert_eq!(equipment.next.as_deref(), Some("?step=2b&sector=0"));

    let visits = jobs::run_step(&upstream, &store, Step::VisitDates { sector: SECTORS.len() }).await;
    assert_eq!(visits.status, StepStatus::Done);
    assert_eq!(visits.next.as_deref(), Some("?step=3&period=0"));

    let breakdowns = jobs::run_step(&upstream, &store, Step::Breakdowns { period: 7 }).await;
    assert_eq!(breakdowns.status, StepStatus::Done);
    assert_eq!(breakdowns.next.as_deref(), Some("?step=4"));

    assert_eq!(upstream.auth_count(), 0);
    assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn test_auth_failure_aborts_only_the_step() {
    let upstream = FakeUpstream::new();
    upstream
        .fail_auth("no WSID in authentication response")
        .respond(methods::EQUIPMENT, equipment_response(&["1"]));
    let store = MemoryStore::new();
    store.seed(tables::EQUIPMENT, vec![row(json!({"id_wsoucont": 7}))]);

    let report = jobs::run_step(&upstream, &store, Step::Equipment { sector: 0 }).await;

    assert_eq!(report.status, StepStatus::Error);
    assert_eq!(report.message.as_deref(), Some("Auth failed"));
    assert!(upstream.calls().is_empty());
    assert_eq!(ids_in(&store, tables::EQUIPMENT, "id_wsoucont"), vec![7]);
}

#[tokio::test]
async fn test_visit_dates_patch_existing_equipment() {
    let upstream = FakeUpstream::new();
    let records = vec![
        vec![("IDWSOUCONT", "1"), ("DATEPASS1", "20241201"), ("DATEPASS2", "20240901")],
        vec![("DATEPASS1", "20241201")],
    ];
    upstream.respond(
        methods::EQUIPMENT_SUPPLEMENT,
        soap_response(methods::EQUIPMENT_SUPPLEMENT, "tabListeWsoucont2", &records),
    );
    let store = MemoryStore::new();
    store.seed(
        tables::EQUIPMENT,
        vec![row(json!({"id_wsoucont": 1, "adresse": "12 rue Blatin"}))],
    );

    let report = jobs::run_step(&upstream, &store, Step::VisitDates { sector: 21 }).await;

    assert_eq!(report.status, StepStatus::Success);
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.next.as_deref(), Some("?step=3&period=0"));

    let rows = store.rows(tables::EQUIPMENT);
    assert_eq!(rows[0]["adresse"], "12 rue Blatin");
    assert_eq!(rows[0]["passage_1"], "2024-12-01");
    assert_eq!(rows[0]["dernier_passage"], "2024-12-01");
    assert_eq!(rows[0]["passage_2"], "2024-09-01");
}

#[tokio::test]
async fn test_planning_types_replace_the_table() {
    let upstream = FakeUpstream::new();
    let records = vec![
        vec![("IDWTYPEPLA", "1"), ("TYPEPLANNING", "P9"), ("NB_VISITES", "9"), ("LIBELLEPLAN", "Neuf")],
        vec![("IDWTYPEPLA", "2"), ("TYPEPLANNING", "P12"), ("NB_VISITES", "12")],
    ];
    upstream.respond(
        methods::PLANNING_TYPES,
        soap_response(methods::PLANNING_TYPES, "ST_Wtypepla", &records),
    );
    let store = MemoryStore::new();
    store.seed(tables::PLANNING_TYPES, vec![row(json!({"code": "OLD", "nb_visites": 1}))]);

    let report = jobs::run_step(&upstream, &store, Step::PlanningTypes).await;

    assert_eq!(report.status, StepStatus::Success);
    assert_eq!(report.written, 2);
    assert_eq!(report.next.as_deref(), Some("?step=1"));

    let codes: Vec<Value> = store
        .rows(tables::PLANNING_TYPES)
        .iter()
        .map(|r| r["code"].clone())
        .collect();
    assert_eq!(codes, vec![json!("P9"), json!("P12")]);
}

#[tokio::test]
async fn test_empty_planning_response_is_an_error() {
    let upstream = FakeUpstream::new();
    upstream.respond(
        methods::PLANNING_TYPES,
        soap_response(methods::PLANNING_TYPES, "tabListeWtypepla", &[]),
    );
    let store = MemoryStore::new();
    store.seed(tables::PLANNING_TYPES, vec![row(json!({"code": "P9", "nb_visites": 9}))]);

    let report = jobs::run_step(&upstream, &store, Step::PlanningTypes).await;

    assert_eq!(report.status, StepStatus::Error);
    assert_eq!(report.message.as_deref(), Some("No data in Wtypepla response"));
    assert_eq!(store.rows(tables::PLANNING_TYPES).len(), 1);
}

/// Equipment {A,B,C} with stoppage snapshot {B}: only B ends up flagged.
#[tokio::test]
async fn test_derived_pass_reconciles_flags_and_visits() {
    let upstream = FakeUpstream::new();
    let store = MemoryStore::new();
    store.seed(
        tables::PLANNING_TYPES,
        vec![
            row(json!({"code": "P9", "nb_visites": 9})),
            row(json!({"code": "P12", "nb_visites": 12})),
        ],
    );
    store.seed(
        tables::EQUIPMENT,
        vec![
            row(json!({"id_wsoucont": 1, "type_planning": "P9", "en_arret": true})),
            row(json!({"id_wsoucont": 2, "type_planning": "P12", "en_arret": false})),
            row(json!({"id_wsoucont": 3, "type_planning": null, "en_arret": true})),
        ],
    );
    store.seed(tables::STOPPAGES, vec![row(json!({"id_wsoucont": 2}))]);

    let report = jobs::run_step(&upstream, &store, Step::Derived).await;

    assert_eq!(report.status, StepStatus::Success);
    assert!(report.next.is_none());
    let derived = report.derived.unwrap();
    assert_eq!(derived.visits_updated, 2);
    assert_eq!(derived.equipment_total, 3);
    assert_eq!(derived.stopped, 1);

    let rows = store.rows(tables::EQUIPMENT);
    let flag = |id: i64| {
        rows.iter()
            .find(|r| r["id_wsoucont"] == id)
            .map(|r| r["en_arret"].clone())
            .unwrap()
    };
    assert_eq!(flag(1), false);
    assert_eq!(flag(2), true);
    assert_eq!(flag(3), false);
    assert_eq!(rows[0]["nb_visites_an"], 9);
    assert_eq!(rows[1]["nb_visites_an"], 12);

    let logs = store.rows(tables::SYNC_LOGS);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["sync_type"], "full");
    assert_eq!(logs[0]["status"], "success");
    assert_eq!(logs[0]["arrets_count"], 1);
    assert!(upstream.calls().is_empty());
}

#[tokio::test]
async fn test_derived_pass_requires_planning_types() {
    let upstream = FakeUpstream::new();
    let store = MemoryStore::new();

    let report = jobs::run_step(&upstream, &store, Step::Derived).await;

    assert_eq!(report.status, StepStatus::Error);
    assert!(report.message.unwrap().contains("?step=0"));
    assert!(store.rows(tables::SYNC_LOGS).is_empty());
}
