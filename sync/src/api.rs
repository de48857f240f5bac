//! Persistence client — async CRUD against the whiteboard HTTP API.
//!
//! DESIGN
//! ======
//! `PersistenceApi` is the seam between the engine and the backend: the page
//! lifecycle and the connection manager talk to the trait, tests substitute
//! a recording mock, and `HttpPersistence` is the reqwest implementation.
//! Calls are one-shot with no retries and no caching; callers decide what a
//! failure means (the page lifecycle rolls back, the engine logs and
//! abandons).

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use records::Record;
use wire::PageInfo;

/// Errors produced by persistence calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP exchange itself failed (connect, timeout, body decode).
    #[error("persistence request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The backend answered with a non-success status.
    #[error("persistence call {path} returned status {status}")]
    Status { status: u16, path: String },
}

/// One persisted shape row. The shape body travels as a JSON string under
/// the literal field name `jsonDate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRow {
    pub id: String,
    #[serde(rename = "jsonDate")]
    pub json_date: String,
}

impl ShapeRow {
    /// Serialize a store record into a row.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.id.as_str().to_owned(),
            // Serializing a `Value` to a string cannot fail.
            json_date: serde_json::to_string(&record.data).unwrap_or_default(),
        }
    }

    /// Parse the row back into a store record. `None` when the stored body
    /// is not valid JSON.
    #[must_use]
    pub fn to_record(&self) -> Option<Record> {
        let data = serde_json::from_str(&self.json_date).ok()?;
        Some(Record::new(records::RecordId::new(self.id.clone()), data))
    }
}

/// Async boundary to the whiteboard persistence HTTP API.
#[async_trait]
pub trait PersistenceApi: Send + Sync {
    /// All pages of a whiteboard.
    async fn list_pages(&self, whiteboard_id: i64) -> Result<Vec<PageInfo>, ApiError>;

    /// Create a page; the backend assigns the numeric id.
    async fn create_page(&self, whiteboard_id: i64, title: &str) -> Result<PageInfo, ApiError>;

    /// Change a page title.
    async fn rename_page(&self, whiteboard_id: i64, page_id: i64, title: &str)
    -> Result<(), ApiError>;

    /// Delete a page and its shapes.
    async fn delete_page(&self, whiteboard_id: i64, page_id: i64) -> Result<(), ApiError>;

    /// All persisted shapes of one page.
    async fn list_shapes(&self, whiteboard_id: i64, page_id: i64)
    -> Result<Vec<ShapeRow>, ApiError>;

    /// Persist a batch of new shapes.
    async fn save_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        shapes: &[ShapeRow],
    ) -> Result<(), ApiError>;

    /// Persist a batch of shape updates.
    async fn update_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        shapes: &[ShapeRow],
    ) -> Result<(), ApiError>;

    /// Delete a batch of shapes by id.
    async fn delete_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        ids: &[String],
    ) -> Result<(), ApiError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageTitleBody<'a> {
    page_title: &'a str,
}

#[derive(Serialize)]
struct DeleteShapesBody<'a> {
    ids: &'a [String],
}

/// reqwest-backed implementation of [`PersistenceApi`].
pub struct HttpPersistence {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPersistence {
    /// Build a client rooted at `base_url`, e.g. `http://127.0.0.1:3000`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn pages_path(whiteboard_id: i64) -> String {
        format!("/api/whiteboard/{whiteboard_id}/pages")
    }

    fn page_path(whiteboard_id: i64, page_id: i64) -> String {
        format!("/api/whiteboard/{whiteboard_id}/pages/{page_id}")
    }

    fn shapes_path(whiteboard_id: i64, page_id: i64) -> String {
        format!("/api/whiteboard/{whiteboard_id}/pages/{page_id}/shapes")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn check(path: &str, response: &reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ApiError::Status { status: status.as_u16(), path: path.to_owned() })
        }
    }
}

#[async_trait]
impl PersistenceApi for HttpPersistence {
    async fn list_pages(&self, whiteboard_id: i64) -> Result<Vec<PageInfo>, ApiError> {
        let path = Self::pages_path(whiteboard_id);
        let response = self.client.get(self.url(&path)).send().await?;
        Self::check(&path, &response)?;
        Ok(response.json().await?)
    }

    async fn create_page(&self, whiteboard_id: i64, title: &str) -> Result<PageInfo, ApiError> {
        let path = Self::pages_path(whiteboard_id);
        let response = self
            .client
            .post(self.url(&path))
            .json(&PageTitleBody { page_title: title })
            .send()
            .await?;
        Self::check(&path, &response)?;
        Ok(response.json().await?)
    }

    async fn rename_page(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        title: &str,
    ) -> Result<(), ApiError> {
        let path = Self::page_path(whiteboard_id, page_id);
        let response = self
            .client
            .put(self.url(&path))
            .json(&PageTitleBody { page_title: title })
            .send()
            .await?;
        Self::check(&path, &response)
    }

    async fn delete_page(&self, whiteboard_id: i64, page_id: i64) -> Result<(), ApiError> {
        let path = Self::page_path(whiteboard_id, page_id);
        let response = self.client.delete(self.url(&path)).send().await?;
        Self::check(&path, &response)
    }

    async fn list_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
    ) -> Result<Vec<ShapeRow>, ApiError> {
        let path = Self::shapes_path(whiteboard_id, page_id);
        let response = self.client.get(self.url(&path)).send().await?;
        Self::check(&path, &response)?;
        Ok(response.json().await?)
    }

    async fn save_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        shapes: &[ShapeRow],
    ) -> Result<(), ApiError> {
        let path = Self::shapes_path(whiteboard_id, page_id);
        let response = self.client.post(self.url(&path)).json(shapes).send().await?;
        Self::check(&path, &response)
    }

    async fn update_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        shapes: &[ShapeRow],
    ) -> Result<(), ApiError> {
        let path = Self::shapes_path(whiteboard_id, page_id);
        let response = self.client.put(self.url(&path)).json(shapes).send().await?;
        Self::check(&path, &response)
    }

    async fn delete_shapes(
        &self,
        whiteboard_id: i64,
        page_id: i64,
        ids: &[String],
    ) -> Result<(), ApiError> {
        let path = format!("{}/delete", Self::shapes_path(whiteboard_id, page_id));
        let response = self
            .client
            .post(self.url(&path))
            .json(&DeleteShapesBody { ids })
            .send()
            .await?;
        Self::check(&path, &response)
    }
}
