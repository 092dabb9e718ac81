//! In-process `RecordStore` used for dry runs and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::services::record_store::{Filter, RecordStore, Row, SelectQuery};

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Vec<Row>>,
    write_calls: HashMap<String, usize>,
    failing_writes: HashSet<(String, usize)>,
}

impl Inner {
    /// Count a write against `table` and fail it when it was scheduled to fail.
    fn register_write(&mut self, table: &str) -> Result<()> {
        let n = self.write_calls.entry(table.to_string()).or_insert(0);
        let call = *n;
        *n += 1;
        if self.failing_writes.contains(&(table.to_string(), call)) {
            return Err(SyncError::store_write(table, format!("injected failure on write #{}", call)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`-th (zero-based) write call against `table` fail.
    pub fn fail_write(&self, table: &str, n: usize) {
        self.inner.lock().failing_writes.insert((table.to_string(), n));
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.inner.lock().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.inner
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }
}

fn merge(target: &mut Row, patch: &Row) {
    for (k, v) in patch {
        target.insert(k.clone(), v.clone());
    }
}

fn same_key(row: &Row, column: &str, key: &Value) -> bool {
    Filter::Eq(column.to_string(), key.clone()).matches(row)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.register_write(table)?;
        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.register_write(table)?;
        let existing = inner.tables.entry(table.to_string()).or_default();

        for row in rows {
            let key = row.get(on_conflict).cloned().unwrap_or(Value::Null);
            if key.is_null() {
                return Err(SyncError::store_write(
                    table,
                    format!("null value in conflict column {}", on_conflict),
                ));
            }
            match existing.iter_mut().find(|r| same_key(r, on_conflict, &key)) {
                Some(current) => merge(current, row),
                None => existing.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: &Row) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.register_write(table)?;
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.iter_mut()
                .filter(|r| same_key(r, key_column, key))
                .for_each(|r| merge(r, patch));
        }
        Ok(())
    }

    async fn delete_all(&self, table: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.register_write(table)?;
        inner.tables.remove(table);
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.register_write(table)?;
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|r| !filters.iter().all(|f| f.matches(r)));
        }
        Ok(())
    }

    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let inner = self.inner.lock();
        let mut rows: Vec<Row> = inner
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| query.filters.iter().all(|f| f.matches(r)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((column, desc)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = sort_key(a.get(column)).cmp(&sort_key(b.get(column)));
                if *desc { ordering.reverse() } else { ordering }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        if !query.columns.is_empty() {
            rows = rows
                .into_iter()
                .map(|r| {
                    query
                        .columns
                        .iter()
                        .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                        .collect()
                })
                .collect();
        }
        Ok(rows)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let inner = self.inner.lock();
        let count = inner
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|r| filters.iter().all(|f| f.matches(r))).count())
            .unwrap_or(0);
        Ok(count as u64)
    }
}

// Nulls sort first; numbers compare numerically, everything else by its text.
fn sort_key(value: Option<&Value>) -> (u8, i64, String) {
    match value {
        None | Some(Value::Null) => (0, 0, String::new()),
        Some(Value::Number(n)) => (1, n.as_i64().unwrap_or_default(), String::new()),
        Some(Value::String(s)) => (2, 0, s.clone()),
        Some(other) => (2, 0, other.to_string()),
    }
}
