//! Reconciliation of the `en_arret` flag on equipment against the stoppage snapshot.

use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::error::Result;
use crate::models::equipment::{KEY_COLUMN, STOPPED_COLUMN};
use crate::services::record_store::{RecordStore, Row, SelectQuery, tables};

/// How far a reconciliation goes.
///
/// The derived pass clears every flag that is no longer backed by a stoppage; the fast path only
/// raises flags for the stoppages it just fetched and leaves stale `true` flags for the next
/// derived pass to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagReconciliation {
    SetOnly,
    ClearThenSet,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagOutcome {
    /// Rows considered.
    pub examined: usize,
    /// Updates that went through.
    pub changed: usize,
    pub errors: Vec<String>,
}

/// Equipment keys present in the stoppage snapshot.
pub async fn current_stopped_ids(store: &dyn RecordStore) -> Result<BTreeSet<i64>> {
    let rows = store
        .select(&SelectQuery::new(tables::STOPPAGES).columns(&[KEY_COLUMN]))
        .await?;
    Ok(rows.iter().filter_map(|r| id_of(r)).collect())
}

pub async fn reconcile_stopped_flags(
    store: &dyn RecordStore,
    stopped: &BTreeSet<i64>,
    mode: FlagReconciliation,
) -> Result<FlagOutcome> {
    match mode {
        FlagReconciliation::SetOnly => {
            let mut outcome = FlagOutcome::default();
            for id in stopped {
                outcome.examined += 1;
                set_flag(store, *id, true, &mut outcome).await;
            }
            Ok(outcome)
        }
        FlagReconciliation::ClearThenSet => {
            let equipment = store
                .select(&SelectQuery::new(tables::EQUIPMENT).columns(&[KEY_COLUMN, STOPPED_COLUMN]))
                .await?;

            let mut outcome = FlagOutcome::default();
            for row in &equipment {
                let Some(id) = id_of(row) else { continue };
                outcome.examined += 1;

                let desired = stopped.contains(&id);
                let current = row.get(STOPPED_COLUMN).and_then(Value::as_bool);
                if current != Some(desired) {
                    set_flag(store, id, desired, &mut outcome).await;
                }
            }
            Ok(outcome)
        }
    }
}

async fn set_flag(store: &dyn RecordStore, id: i64, stopped: bool, outcome: &mut FlagOutcome) {
    let mut patch = Row::new();
    patch.insert(STOPPED_COLUMN.to_string(), json!(stopped));

    match store
        .update(tables::EQUIPMENT, KEY_COLUMN, &Value::from(id), &patch)
        .await
    {
        Ok(()) => outcome.changed += 1,
        Err(e) => {
            tracing::warn!("Failed to set {}={} on {}: {}", STOPPED_COLUMN, stopped, id, e);
            outcome.errors.push(format!("{}: {}", id, e));
        }
    }
}

fn id_of(row: &Row) -> Option<i64> {
    match row.get(KEY_COLUMN)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
