//! Shared relay state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. Each
//! whiteboard holds its connected clients plus the in-memory persistence
//! tables (pages and per-page shapes) behind one `RwLock`. Boards come into
//! existence on first touch and are evicted when the last client leaves and
//! no persisted state remains.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use wire::{PageInfo, WireMessage};

/// One persisted shape row, body serialized under the literal `jsonDate`
/// field the clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRow {
    pub id: String,
    #[serde(rename = "jsonDate")]
    pub json_date: String,
}

/// Sender side of one connected websocket client.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Page this connection is scoped to.
    pub page_id: i64,
    pub drawer_id: String,
    /// Bounded: a slow consumer drops frames, it never blocks the room.
    pub tx: mpsc::Sender<WireMessage>,
}

/// Live and persisted state of one whiteboard.
#[derive(Default)]
pub struct BoardState {
    /// Connected clients keyed by connection id.
    pub clients: HashMap<Uuid, ClientHandle>,
    /// Persisted pages, ordered by id.
    pub pages: BTreeMap<i64, String>,
    /// Persisted shapes per page, keyed by shape id.
    pub shapes: HashMap<i64, BTreeMap<String, ShapeRow>>,
    /// Next server-assigned page id.
    pub next_page_id: i64,
}

impl BoardState {
    #[must_use]
    pub fn new() -> Self {
        Self { next_page_id: 1, ..Self::default() }
    }

    /// Assign the next monotonic page id.
    pub fn assign_page_id(&mut self) -> i64 {
        let id = self.next_page_id;
        self.next_page_id += 1;
        id
    }

    /// Pages as wire-facing rows, in id order.
    #[must_use]
    pub fn page_infos(&self) -> Vec<PageInfo> {
        self.pages
            .iter()
            .map(|(page_id, title)| PageInfo { page_id: *page_id, page_title: title.clone() })
            .collect()
    }
}

/// Shared application state, injected into Axum handlers.
#[derive(Clone, Default)]
pub struct AppState {
    pub boards: Arc<RwLock<HashMap<i64, BoardState>>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
