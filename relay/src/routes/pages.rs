//! REST handlers for the pages and shapes persistence boundary.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use wire::PageInfo;

use crate::state::{AppState, ShapeRow};
use crate::store::{self, StoreError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTitleBody {
    pub page_title: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteShapesBody {
    pub ids: Vec<String>,
}

/// `GET /api/whiteboard/{w}/pages`
pub async fn list_pages(
    State(state): State<AppState>,
    Path(whiteboard_id): Path<i64>,
) -> Json<Vec<PageInfo>> {
    Json(store::list_pages(&state, whiteboard_id).await)
}

/// `POST /api/whiteboard/{w}/pages`
pub async fn create_page(
    State(state): State<AppState>,
    Path(whiteboard_id): Path<i64>,
    Json(body): Json<PageTitleBody>,
) -> (StatusCode, Json<PageInfo>) {
    let page = store::create_page(&state, whiteboard_id, &body.page_title).await;
    (StatusCode::CREATED, Json(page))
}

/// `PUT /api/whiteboard/{w}/pages/{p}`
pub async fn rename_page(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
    Json(body): Json<PageTitleBody>,
) -> Result<StatusCode, StatusCode> {
    store::rename_page(&state, whiteboard_id, page_id, &body.page_title)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /api/whiteboard/{w}/pages/{p}`
pub async fn delete_page(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
) -> Result<StatusCode, StatusCode> {
    store::delete_page(&state, whiteboard_id, page_id)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/whiteboard/{w}/pages/{p}/shapes`
pub async fn list_shapes(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<ShapeRow>>, StatusCode> {
    let rows = store::list_shapes(&state, whiteboard_id, page_id)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(rows))
}

/// `POST /api/whiteboard/{w}/pages/{p}/shapes`
pub async fn save_shapes(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
    Json(rows): Json<Vec<ShapeRow>>,
) -> Result<StatusCode, StatusCode> {
    store::upsert_shapes(&state, whiteboard_id, page_id, rows)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/whiteboard/{w}/pages/{p}/shapes`
pub async fn update_shapes(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
    Json(rows): Json<Vec<ShapeRow>>,
) -> Result<StatusCode, StatusCode> {
    store::upsert_shapes(&state, whiteboard_id, page_id, rows)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/whiteboard/{w}/pages/{p}/shapes/delete`
pub async fn delete_shapes(
    State(state): State<AppState>,
    Path((whiteboard_id, page_id)): Path<(i64, i64)>,
    Json(body): Json<DeleteShapesBody>,
) -> Result<StatusCode, StatusCode> {
    store::delete_shapes(&state, whiteboard_id, page_id, &body.ids)
        .await
        .map_err(store_error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

fn store_error_to_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::WhiteboardNotFound(_) | StoreError::PageNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
    }
}
