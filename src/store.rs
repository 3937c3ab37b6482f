//! Record store access.
//!
//! The console treats the hosted table service as plain CRUD keyed by numeric
//! row ids. [`RecordStore`] is the seam; [`HttpRecordStore`] talks to the hosted
//! REST API and [`crate::db::LocalRecordStore`] keeps tables in a JSON file.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

use crate::error::{StoreError, StoreResult};
use crate::fields::RowId;
use crate::rows::{Fields, Row};

/// Numeric table id in the record store.
pub type TableId = u64;

/// Equality filter on a field, the only server-side filtering assumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Filter { field: field.into(), value: value.into() }
    }

    /// Whether `row` satisfies the filter, for stores that filter client-side.
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.field) {
            Some(serde_json::Value::String(s)) => *s == self.value,
            Some(serde_json::Value::Object(o)) => {
                o.get("value").and_then(|v| v.as_str()) == Some(self.value.as_str())
            }
            Some(other) => other.to_string() == self.value,
            None => false,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_rows(&self, table: TableId, filters: &[Filter]) -> StoreResult<Vec<Row>>;

    /// Patch the given fields and return the updated row.
    async fn update_row(&self, table: TableId, row_id: RowId, fields: Fields) -> StoreResult<Row>;

    async fn create_row(&self, table: TableId, fields: Fields) -> StoreResult<Row>;
}

/// Connection settings for [`HttpRecordStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            timeout_secs: 30,
            page_size: 200,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page {
    next: Option<String>,
    results: Vec<Row>,
}

/// REST client for the hosted table service.
pub struct HttpRecordStore {
    config: HttpStoreConfig,
    client: Client,
}

impl HttpRecordStore {
    pub fn new(config: HttpStoreConfig) -> StoreResult<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = config.token {
            let value = header::HeaderValue::from_str(&format!("Token {token}")).map_err(|_| StoreError::Server {
                status: 0,
                message: "API token contains characters not allowed in a header".into(),
            })?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, table: TableId) -> String {
        format!("{}/api/database/rows/table/{}/", self.config.base_url.trim_end_matches('/'), table)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> StoreResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Server { status: status.as_u16(), message })
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list_rows(&self, table: TableId, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        let mut query: Vec<(String, String)> = vec![
            ("user_field_names".into(), "true".into()),
            ("size".into(), self.config.page_size.to_string()),
        ];
        for f in filters {
            query.push((format!("filter__{}__equal", f.field), f.value.clone()));
        }

        let first = self.client.get(self.table_url(table)).query(&query).send().await?;
        let mut page: Page = self.handle_response(first).await?;
        let mut rows = std::mem::take(&mut page.results);

        // `next` is an absolute URL that already carries the query.
        while let Some(next) = page.next.take() {
            let response = self.client.get(&next).send().await?;
            page = self.handle_response(response).await?;
            rows.append(&mut page.results);
        }

        tracing::debug!(table, rows = rows.len(), "listed rows");
        Ok(rows)
    }

    async fn update_row(&self, table: TableId, row_id: RowId, fields: Fields) -> StoreResult<Row> {
        let url = format!("{}{}/", self.table_url(table), row_id);
        let response = self
            .client
            .patch(&url)
            .query(&[("user_field_names", "true")])
            .json(&fields)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound { table, row: row_id });
        }
        self.handle_response(response).await
    }

    async fn create_row(&self, table: TableId, fields: Fields) -> StoreResult<Row> {
        let response = self
            .client
            .post(self.table_url(table))
            .query(&[("user_field_names", "true")])
            .json(&fields)
            .send()
            .await?;
        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(server: &MockServer) -> HttpRecordStore {
        HttpRecordStore::new(HttpStoreConfig {
            base_url: server.uri(),
            token: Some("secret".into()),
            timeout_secs: 5,
            page_size: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn list_rows_follows_pagination() {
        let server = MockServer::start().await;
        let next = format!("{}/api/database/rows/table/7/?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/7/"))
            .and(query_param("user_field_names", "true"))
            .and(query_param("filter__Status__equal", "New"))
            .and(header("authorization", "Token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3, "next": next, "results": [{"id": 1}, {"id": 2}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/database/rows/table/7/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3, "next": null, "results": [{"id": 3}]
            })))
            .mount(&server)
            .await;

        let rows = store(&server).list_rows(7, &[Filter::equal("Status", "New")]).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_u64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn update_row_sends_partial_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/database/rows/table/7/12/"))
            .and(body_json(json!({"Status": "Done"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 12, "Status": "Done"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut fields = Fields::new();
        fields.insert("Status".into(), json!("Done"));
        let row = store(&server).update_row(7, 12, fields).await.unwrap();
        assert_eq!(row["Status"], json!("Done"));
    }

    #[tokio::test]
    async fn server_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/database/rows/table/7/1/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/database/rows/table/7/2/"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad option"))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/database/rows/table/7/3/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let s = store(&server);
        let busy = s.update_row(7, 1, Fields::new()).await.unwrap_err();
        assert!(busy.is_transient());
        let bad = s.update_row(7, 2, Fields::new()).await.unwrap_err();
        assert!(matches!(bad, StoreError::Server { status: 400, .. }));
        assert!(!bad.is_transient());
        let gone = s.update_row(7, 3, Fields::new()).await.unwrap_err();
        assert!(matches!(gone, StoreError::NotFound { table: 7, row: 3 }));
    }

    #[test]
    fn filters_match_plain_and_select_values() {
        let row = json!({"id": 1, "Status": {"id": 2, "value": "New"}, "Owner": "mia"});
        let row = row.as_object().unwrap();
        assert!(Filter::equal("Status", "New").matches(row));
        assert!(Filter::equal("Owner", "mia").matches(row));
        assert!(!Filter::equal("Owner", "sam").matches(row));
    }
}
