//! `RecordStore` over the hosted PostgREST data API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::services::record_store::{Filter, RecordStore, Row, SelectQuery};

const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(15);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Rows requested per page; matches the default max-rows of hosted PostgREST.
const PAGE_SIZE: usize = 1000;

/// PostgREST refuses unfiltered deletes; every mirror table carries a uuid `id`, so this filter
/// selects all rows.
const DELETE_ALL_FILTER: (&str, &str) = ("id", "neq.00000000-0000-0000-0000-000000000000");

#[derive(Clone)]
pub struct RestRecordStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestRecordStore {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn fetch_page(&self, table: &str, params: &[(String, String)]) -> Result<Vec<Row>> {
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(params)
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::store_read(table, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::store_read(table, format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<Vec<Row>>()
            .await
            .map_err(|e| SyncError::store_read(table, format!("JSON parse error: {}", e)))
    }

    async fn expect_success(table: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(SyncError::store_write(
            table,
            format!("HTTP {}: {}", status.as_u16(), crate::error::truncate(&text, 500)),
        ))
    }
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_query_pair).collect()
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn insert(&self, table: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .timeout(WRITE_TIMEOUT)
            .json(rows)
            .send()
            .await
            .map_err(|e| SyncError::store_write(table, e.to_string()))?;
        Self::expect_success(table, response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[Row], on_conflict: &str) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let response = self
            .authorized(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .timeout(WRITE_TIMEOUT)
            .json(rows)
            .send()
            .await
            .map_err(|e| SyncError::store_write(table, e.to_string()))?;
        Self::expect_success(table, response).await?;
        Ok(())
    }

    async fn update(&self, table: &str, key_column: &str, key: &Value, patch: &Row) -> Result<()> {
        let (column, operand) = Filter::eq(key_column, key.clone()).to_query_pair();
        let response = self
            .authorized(self.client.patch(self.table_url(table)))
            .query(&[(column, operand)])
            .header("Prefer", "return=minimal")
            .timeout(UPDATE_TIMEOUT)
            .json(patch)
            .send()
            .await
            .map_err(|e| SyncError::store_write(table, e.to_string()))?;
        Self::expect_success(table, response).await?;
        Ok(())
    }

    async fn delete_all(&self, table: &str) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&[DELETE_ALL_FILTER])
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::store_write(table, e.to_string()))?;
        Self::expect_success(table, response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<()> {
        if filters.is_empty() {
            return self.delete_all(table).await;
        }
        let response = self
            .authorized(self.client.delete(self.table_url(table)))
            .query(&filter_pairs(filters))
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::store_write(table, e.to_string()))?;
        Self::expect_success(table, response).await?;
        Ok(())
    }

    /// Unlimited selects are read page by page, since the API caps each response at its
    /// configured max-rows.
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>> {
        let table = query.table.as_str();
        let select = if query.columns.is_empty() {
            "*".to_string()
        } else {
            query.columns.join(",")
        };

        let mut params = vec![("select".to_string(), select)];
        params.extend(filter_pairs(&query.filters));
        match &query.order_by {
            Some((column, desc)) => {
                let direction = if *desc { "desc" } else { "asc" };
                params.push(("order".to_string(), format!("{}.{}", column, direction)));
            }
            // Offsets are only stable over a total order.
            None if query.limit.is_none() => params.push(("order".to_string(), "id.asc".to_string())),
            None => {}
        }

        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
            return self.fetch_page(table, &params).await;
        }

        let mut all_rows: Vec<Row> = Vec::new();
        loop {
            let mut page_params = params.clone();
            page_params.push(("limit".to_string(), PAGE_SIZE.to_string()));
            page_params.push(("offset".to_string(), all_rows.len().to_string()));

            let page = self.fetch_page(table, &page_params).await?;
            let last_page = page.len() < PAGE_SIZE;
            all_rows.extend(page);
            if last_page {
                break;
            }
        }
        Ok(all_rows)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let mut params = vec![("select".to_string(), "count".to_string())];
        params.extend(filter_pairs(filters));

        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(&params)
            .header("Prefer", "count=exact")
            .timeout(READ_TIMEOUT)
            .send()
            .await
            .map_err(|e| SyncError::store_read(table, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::store_read(table, format!("HTTP {}", status.as_u16())));
        }

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("0/0");
        parse_content_range_total(content_range)
            .ok_or_else(|| SyncError::store_read(table, format!("bad Content-Range '{}'", content_range)))
    }
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range_total(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}
