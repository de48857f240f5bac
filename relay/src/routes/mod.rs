//! Router assembly.
//!
//! One router carries both faces of the relay: the websocket endpoint that
//! fans wire messages out to page peers, and the REST persistence boundary
//! for pages and shapes.

pub mod pages;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/whiteboard/{whiteboard_id}/pages",
            get(pages::list_pages).post(pages::create_page),
        )
        .route(
            "/api/whiteboard/{whiteboard_id}/pages/{page_id}",
            put(pages::rename_page).delete(pages::delete_page),
        )
        .route(
            "/api/whiteboard/{whiteboard_id}/pages/{page_id}/shapes",
            get(pages::list_shapes)
                .post(pages::save_shapes)
                .put(pages::update_shapes),
        )
        .route(
            "/api/whiteboard/{whiteboard_id}/pages/{page_id}/shapes/delete",
            post(pages::delete_shapes),
        )
        .route("/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
