//! Process configuration read from the environment.

use std::env;
use std::time::Duration;

use crate::error::{Result, SyncError};

pub const DEFAULT_WS_URL: &str =
    "https://ws.progilift.fr/WS_PROGILIFT_20230419_WEB/awws/WS_Progilift_20230419.awws";
pub const DEFAULT_SITE_CODE: &str = "AUVNB1";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Rest,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_key: String,
    pub site_code: String,
    pub ws_url: String,
    pub store_backend: StoreBackend,
    pub bind_addr: String,
    pub cron_interval: Option<Duration>,
    pub fast_path_lookback_days: Option<i64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests don't have to touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match get("STORE_BACKEND").as_deref() {
            None | Some("rest") => StoreBackend::Rest,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(SyncError::Config(format!(
                    "STORE_BACKEND must be 'rest' or 'memory', got '{}'",
                    other
                )));
            }
        };

        let supabase_url = get("SUPABASE_URL").unwrap_or_default();
        let supabase_key = get("SUPABASE_KEY").unwrap_or_default();
        if store_backend == StoreBackend::Rest && (supabase_url.is_empty() || supabase_key.is_empty())
        {
            return Err(SyncError::Config(
                "SUPABASE_URL and SUPABASE_KEY must be set for the rest store".to_string(),
            ));
        }

        let cron_interval = parse_number::<u64>(get("CRON_INTERVAL_SECS"), "CRON_INTERVAL_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let fast_path_lookback_days =
            parse_number::<i64>(get("FAST_PATH_LOOKBACK_DAYS"), "FAST_PATH_LOOKBACK_DAYS")?;

        Ok(Self {
            supabase_url,
            supabase_key,
            site_code: get("PROGILIFT_CODE").unwrap_or_else(|| DEFAULT_SITE_CODE.to_string()),
            ws_url: get("PROGILIFT_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            store_backend,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            cron_interval,
            fast_path_lookback_days,
        })
    }
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, key: &str) -> Result<Option<T>> {
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|_| SyncError::Config(format!("{} must be a number, got '{}'", key, v)))
    })
    .transpose()
}
