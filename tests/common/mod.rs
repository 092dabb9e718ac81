#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use progilift_sync::{
    AppState,
    error::{Result, SyncError},
    jobs::fast_path::FastPathOptions,
    services::{
        memory_store::MemoryStore,
        progilift::{SessionToken, Upstream},
        record_store::Row,
    },
};

/// One recorded upstream call: method and parameters.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted upstream: each method answers with the body registered for it, or fails.
#[derive(Default)]
pub struct FakeUpstream {
    bodies: Mutex<HashMap<String, Vec<String>>>,
    failures: Mutex<HashMap<String, String>>,
    auth_failure: Mutex<Option<String>>,
    calls: Mutex<Vec<RecordedCall>>,
    auth_count: Mutex<usize>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` with `body`. Registering several bodies answers them in order, the last
    /// one repeating.
    pub fn respond(&self, method: &str, body: String) -> &Self {
        self.bodies
            .lock()
            .entry(method.to_string())
            .or_default()
            .push(body);
        self
    }

    pub fn fail(&self, method: &str, message: &str) -> &Self {
        self.failures
            .lock()
            .insert(method.to_string(), message.to_string());
        self
    }

    pub fn fail_auth(&self, message: &str) -> &Self {
        *self.auth_failure.lock() = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    pub fn auth_count(&self) -> usize {
        *self.auth_count.lock()
    }
}

#[async_trait]
impl Upstream for FakeUpstream {
    async fn authenticate(&self) -> Result<SessionToken> {
        *self.auth_count.lock() += 1;
        if let Some(message) = self.auth_failure.lock().clone() {
            return Err(SyncError::auth(message));
        }
        SessionToken::parse("0A1B2C3D")
    }

    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        _token: &SessionToken,
        _timeout: Duration,
    ) -> Result<String> {
        let index = {
            let mut calls = self.calls.lock();
            let index = calls.iter().filter(|c| c.method == method).count();
            calls.push(RecordedCall {
                method: method.to_string(),
                params: params
                    .iter()
                    .map(|(n, v)| (n.to_string(), v.clone()))
                    .collect(),
            });
            index
        };

        if let Some(message) = self.failures.lock().get(method) {
            return Err(SyncError::call(method, message.clone()));
        }

        let bodies = self.bodies.lock();
        match bodies.get(method) {
            Some(list) if !list.is_empty() => Ok(list[index.min(list.len() - 1)].clone()),
            _ => Err(SyncError::call(method, "no scripted response")),
        }
    }
}

/// SOAP response wrapping one `<tag>` block per record.
pub fn soap_response(method: &str, tag: &str, records: &[Vec<(&str, &str)>]) -> String {
    let blocks: String = records
        .iter()
        .map(|fields| {
            let leaves: String = fields
                .iter()
                .map(|(name, value)| format!("<{0}>{1}</{0}>", name, value))
                .collect();
            format!("<{0}>{1}</{0}>", tag, leaves)
        })
        .collect();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">"#,
            "<SOAP-ENV:Body><ns1:{0}Response xmlns:ns1=\"urn:WS_Progilift\">",
            "<ns1:{0}Result>{1}</ns1:{0}Result>",
            "</ns1:{0}Response></SOAP-ENV:Body></SOAP-ENV:Envelope>"
        ),
        method, blocks
    )
}

pub fn stoppage(equipment_id: &str, ticket: &str) -> Vec<(&'static str, String)> {
    vec![
        ("nIDSOUCONT", equipment_id.to_string()),
        ("nClepanne", ticket.to_string()),
        ("sAscenseur", format!("ASC-{}", equipment_id)),
        ("sVille", "63000 CLERMONT-FERRAND".to_string()),
        ("nSecteur", "3".to_string()),
        ("sDateAppel", "25/12/2024".to_string()),
        ("sHeureAppel", "9:5".to_string()),
    ]
}

/// Borrowed view of owned fixture fields, as `soap_response` wants them.
pub fn borrowed<'a>(
    records: &'a [Vec<(&'static str, String)>],
) -> Vec<Vec<(&'static str, &'a str)>> {
    records
        .iter()
        .map(|r| r.iter().map(|(n, v)| (*n, v.as_str())).collect())
        .collect()
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("fixture rows are JSON objects")
}

pub fn app_state(upstream: Arc<FakeUpstream>, store: Arc<MemoryStore>) -> AppState {
    AppState {
        upstream,
        store,
        fast_path: FastPathOptions::default(),
    }
}
