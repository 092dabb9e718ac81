//! Tag-scoped scanning of upstream SOAP responses.
//!
//! The upstream envelopes are inconsistently cased and namespaced from one method to the next, so
//! records are pulled out with two regex passes instead of a strict XML parser: first every
//! `<tag>...</tag>` block, then every flat `<Name>text</Name>` leaf inside it. Nested repeated
//! structures are not supported; none of the consumed feeds have any.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

lazy_static! {
    // The regex crate has no backreferences, so closing names are compared after matching.
    static ref LEAF_REGEX: Regex =
        Regex::new(r"<([A-Za-z0-9_]+)>([^<]*)</([A-Za-z0-9_]+)>").unwrap();
    static ref WSID_REGEX: Regex = RegexBuilder::new(r"WSID[^>]*>([A-F0-9]+)<")
        .case_insensitive(true)
        .build()
        .unwrap();
    static ref FAULT_REGEX: Regex = Regex::new(r"(?i)<([A-Za-z0-9_.\-]+:)?Fault[\s/>]").unwrap();
}

/// One upstream record: field name to raw text, `None` when the element was empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawRecord(BTreeMap<String, Option<String>>);

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(|v| v.as_deref())
    }

    /// First non-empty value among several candidate field names.
    pub fn first_of(&self, fields: &[&str]) -> Option<&str> {
        fields.iter().find_map(|f| self.get(f))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RawRecord(
            iter.into_iter()
                .map(|(k, v)| {
                    let v: String = v.into();
                    let v = v.trim().to_string();
                    (k.into(), if v.is_empty() { None } else { Some(v) })
                })
                .collect(),
        )
    }
}

/// Extract every `<tag>` block of `xml` as a flat record. Blocks without any leaf are dropped.
pub fn parse_items(xml: &str, tag: &str) -> Vec<RawRecord> {
    let escaped = regex::escape(tag);
    let block_regex = match RegexBuilder::new(&format!(r"<{0}>(.*?)</{0}>", escaped))
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
    {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!("Invalid block tag '{}': {}", tag, e);
            return Vec::new();
        }
    };

    block_regex
        .captures_iter(xml)
        .map(|block| parse_leaves(&block[1]))
        .filter(|record| !record.is_empty())
        .collect()
}

/// Try each tag in order and return the first non-empty result.
pub fn parse_items_any(xml: &str, tags: &[&str]) -> Vec<RawRecord> {
    tags.iter()
        .map(|tag| parse_items(xml, tag))
        .find(|items| !items.is_empty())
        .unwrap_or_default()
}

fn parse_leaves(block: &str) -> RawRecord {
    let mut fields = BTreeMap::new();
    for cap in LEAF_REGEX.captures_iter(block) {
        if cap[1] != cap[3] {
            continue;
        }
        let text = unescape(cap[2].trim());
        fields.insert(
            cap[1].to_string(),
            if text.is_empty() { None } else { Some(text) },
        );
    }
    RawRecord(fields)
}

/// Session token following a `WSID` marker, wherever it sits in the envelope.
pub fn extract_wsid(xml: &str) -> Option<String> {
    WSID_REGEX.captures(xml).map(|cap| cap[1].to_string())
}

pub fn contains_fault(xml: &str) -> bool {
    FAULT_REGEX.is_match(xml)
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STOPPAGES: &str = r#"<?xml version="1.0"?>
<SOAP-ENV:Envelope><SOAP-ENV:Body><ns1:get_AppareilsArretResponse>
  <tabListeArrets><nIDSOUCONT>1042</nIDSOUCONT><sAdresse>12 rue Haute &amp; Basse</sAdresse><sVille></sVille></tabListeArrets>
  <TABLISTEARRETS><nIDSOUCONT>1043</nIDSOUCONT><sMotifAppel>
     Porte bloquée
  </sMotifAppel></TABLISTEARRETS>
  <tabListeArrets></tabListeArrets>
</ns1:get_AppareilsArretResponse></SOAP-ENV:Body></SOAP-ENV:Envelope>"#;

    #[test]
    fn test_parse_items_scopes_blocks_case_insensitively() {
        let items = parse_items(STOPPAGES, "tabListeArrets");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("nIDSOUCONT"), Some("1042"));
        assert_eq!(items[0].get("sAdresse"), Some("12 rue Haute & Basse"));
        assert_eq!(items[0].get("sVille"), None);
        assert_eq!(items[1].get("sMotifAppel"), Some("Porte bloquée"));
    }

    #[test]
    fn test_parse_items_skips_mismatched_leaves() {
        let xml = "<row><A>1</B><C>2</C></row>";
        let items = parse_items(xml, "row");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("A"), None);
        assert_eq!(items[0].get("C"), Some("2"));
    }

    #[test]
    fn test_parse_items_any_falls_back() {
        let xml = "<ST_Wtypepla><TYPEPLANNING>P4</TYPEPLANNING></ST_Wtypepla>";
        let items = parse_items_any(xml, &["tabListeWtypepla", "ST_Wtypepla", "Wtypepla"]);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].first_of(&["typeplanning", "TYPEPLANNING"]), Some("P4"));
    }

    #[test]
    fn test_extract_wsid() {
        let xml = r#"<soap:Header><ws:WSID xsi:type="xsd:hexBinary">0A1B2C3D</ws:WSID></soap:Header>"#;
        assert_eq!(extract_wsid(xml), Some("0A1B2C3D".to_string()));
        assert_eq!(extract_wsid("<wsid>not-hex</wsid>"), None);
    }

    #[test]
    fn test_contains_fault() {
        assert!(contains_fault("<SOAP-ENV:Fault><faultcode>x</faultcode></SOAP-ENV:Fault>"));
        assert!(contains_fault("<Fault>boom</Fault>"));
        assert!(contains_fault("<soap:Fault/>"));
        assert!(contains_fault(r#"<soap-env.v1:Fault xmlns:x="y">"#));
        assert!(!contains_fault("<SOAP-ENV:FaultyTag>1</SOAP-ENV:FaultyTag>"));
        assert!(!contains_fault("<tabListeWpanne><DEFAULT>1</DEFAULT></tabListeWpanne>"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
    }
}
