//! Real-time whiteboard synchronization engine.
//!
//! The engine sits between an embedding editing surface (which owns
//! rendering and writes user edits into the [`records`] store), a relay
//! server fanning wire messages out to page peers, and a persistence HTTP
//! API holding the canonical page and shape state. [`WhiteboardClient`] ties
//! the pieces together: a page-scoped websocket connection with bounded
//! reconnect, outbound relay of user-origin store batches, inbound
//! application of peer state, a throttled presence broadcaster, and the page
//! lifecycle controller.

pub mod api;
mod client;
mod color;
mod connection;
mod engine;
mod pages;
mod presence;
mod session;

pub use api::{ApiError, HttpPersistence, PersistenceApi, ShapeRow};
pub use client::{ClientConfig, ConnectError, WhiteboardClient};
pub use color::color_for_user;
pub use connection::RelayHandle;
pub use pages::{PageError, PageLifecycle};
pub use presence::{PRESENCE_INTERVAL, PresenceBroadcaster};
pub use session::{ConnectionStatus, EngineEvent, Session};
