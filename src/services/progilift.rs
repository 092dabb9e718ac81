use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, SyncError};
use crate::parsers::xml;

/// Upstream SOAP method names
pub mod methods {
    pub const AUTHENTICATE: &str = "IdentificationTechnicien";
    pub const PLANNING_TYPES: &str = "get_Synchro_Wtypepla";
    pub const STOPPAGES: &str = "get_AppareilsArret";
    pub const EQUIPMENT: &str = "get_Synchro_Wsoucont";
    pub const EQUIPMENT_SUPPLEMENT: &str = "get_Synchro_Wsoucont2";
    pub const BREAKDOWNS: &str = "get_Synchro_Wpanne";
}

/// Per-call timeouts, short for auth and longer for bulk fetches
pub mod timeouts {
    use std::time::Duration;

    pub const AUTH: Duration = Duration::from_secs(15);
    pub const REFERENCE: Duration = Duration::from_secs(30);
    pub const STOPPAGES: Duration = Duration::from_secs(30);
    pub const EQUIPMENT: Duration = Duration::from_secs(120);
    pub const BREAKDOWNS: Duration = Duration::from_secs(180);
    pub const FAST_PATH_BREAKDOWNS: Duration = Duration::from_secs(60);
}

/// "Everything since the beginning" for `dhDerniereMajFichier`.
pub const FULL_HISTORY: &str = "2000-01-01T00:00:00";

/// Hexadecimal WSID handed out by `IdentificationTechnicien`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SyncError::auth("empty session token"));
        }
        // Odd-length tokens are padded so hex validation only checks the alphabet.
        let padded = if raw.len() % 2 == 1 {
            format!("0{}", raw)
        } else {
            raw.to_string()
        };
        hex::decode(&padded)
            .map_err(|e| SyncError::auth(format!("session token is not hexadecimal: {}", e)))?;
        Ok(Self(raw.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The maintenance-data service the mirror is built from.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn authenticate(&self) -> Result<SessionToken>;

    /// Raw response body of `method`. Fails on transport errors, non-200 status, fault envelopes
    /// and timeouts.
    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: &SessionToken,
        timeout: Duration,
    ) -> Result<String>;
}

#[derive(Clone)]
pub struct ProgiliftClient {
    client: Client,
    ws_url: String,
    site_code: String,
}

impl ProgiliftClient {
    pub fn new(ws_url: String, site_code: String) -> Self {
        let client = Client::builder()
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            ws_url,
            site_code,
        }
    }

    async fn post_envelope(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: Option<&SessionToken>,
        timeout: Duration,
    ) -> Result<String> {
        let envelope = build_envelope(method, params, token);

        tracing::debug!("Calling {} ({} params)", method, params.len());

        let response = self
            .client
            .post(&self.ws_url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"urn:WS_Progilift/{}\"", method))
            .timeout(timeout)
            .body(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SyncError::call(method, format!("timed out after {}s", timeout.as_secs()))
                } else {
                    SyncError::call(method, e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::call(method, e.to_string()))?;

        if !status.is_success() {
            return Err(SyncError::call(method, format!("HTTP {}", status)));
        }
        if body.is_empty() {
            return Err(SyncError::call(method, "empty response body"));
        }
        if xml::contains_fault(&body) {
            return Err(SyncError::call(method, "SOAP fault in response"));
        }

        tracing::debug!("{} returned {} bytes", method, body.len());
        Ok(body)
    }
}

#[async_trait]
impl Upstream for ProgiliftClient {
    async fn authenticate(&self) -> Result<SessionToken> {
        let body = self
            .post_envelope(
                methods::AUTHENTICATE,
                &[("sSteCodeWeb", self.site_code.clone())],
                None,
                timeouts::AUTH,
            )
            .await
            .map_err(|e| SyncError::auth(e.to_string()))?;

        let raw = xml::extract_wsid(&body)
            .ok_or_else(|| SyncError::auth("no WSID in authentication response"))?;
        SessionToken::parse(&raw)
    }

    async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        token: &SessionToken,
        timeout: Duration,
    ) -> Result<String> {
        self.post_envelope(method, params, Some(token), timeout).await
    }
}

pub fn build_envelope(
    method: &str,
    params: &[(&str, String)],
    token: Option<&SessionToken>,
) -> String {
    let header = token
        .map(|t| {
            format!(
                r#"<ws:WSID xsi:type="xsd:hexBinary" soap:mustUnderstand="1">{}</ws:WSID>"#,
                t.as_str()
            )
        })
        .unwrap_or_default();

    let body: String = params
        .iter()
        .map(|(name, value)| format!("<ws:{0}>{1}</ws:{0}>", name, xml::escape(value)))
        .collect();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/" xmlns:ws="urn:WS_Progilift" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<soap:Header>{header}</soap:Header>",
            "<soap:Body><ws:{method}>{body}</ws:{method}></soap:Body>",
            "</soap:Envelope>"
        ),
        header = header,
        method = method,
        body = body
    )
}
