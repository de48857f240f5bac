//! Whiteboard relay server.
//!
//! The counterparty the sync engine speaks to: a websocket fan-out per
//! (whiteboard, page) plus an in-memory implementation of the pages/shapes
//! persistence REST boundary. State lives for the process lifetime; there is
//! no database.

pub mod room;
pub mod routes;
pub mod state;
pub mod store;

pub use routes::app;
pub use state::{AppState, ShapeRow};
