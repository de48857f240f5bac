//! Client facade — wires the store, connection, engine, presence gate and
//! page lifecycle into the handle the editing surface consumes.
//!
//! DESIGN
//! ======
//! `connect` resolves the page list through persistence, picks the current
//! page, spawns the connection supervisor and the outbound relay task, and
//! returns a handle owning all of it. The editing surface talks to the store
//! directly (user-origin batches relay automatically); everything structural
//! goes through the methods here.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use records::ChangeStore;
use wire::{Camera, PageInfo};

use crate::api::PersistenceApi;
use crate::connection::{ConnectionManager, RelayHandle};
use crate::engine::Outbound;
use crate::pages::{PageError, PageLifecycle};
use crate::presence::PresenceBroadcaster;
use crate::session::{ConnectionStatus, EngineEvent, Session};

/// Errors raised while establishing a client.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// User id or name missing; no connection is attempted.
    #[error("session identity is incomplete; user id and user name are required")]
    IncompleteIdentity,
    /// The page list could not be resolved.
    #[error(transparent)]
    Pages(#[from] PageError),
}

/// Connection target and identity for one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay base URL, e.g. `ws://127.0.0.1:4000`.
    pub relay_url: String,
    pub whiteboard_id: i64,
    /// Page to open. `None` picks the first page by fractional index.
    pub page_id: Option<i64>,
    pub user_id: String,
    pub user_name: String,
}

/// One connected whiteboard client.
pub struct WhiteboardClient {
    store: Arc<ChangeStore>,
    pages: PageLifecycle,
    presence: PresenceBroadcaster,
    manager: ConnectionManager,
    handle: RelayHandle,
    session_rx: watch::Receiver<Session>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
    outbound: JoinHandle<()>,
}

impl WhiteboardClient {
    /// Resolve pages, open the page-scoped connection, and start relaying.
    ///
    /// # Errors
    ///
    /// [`ConnectError::IncompleteIdentity`] for a blank user id or name,
    /// or the persistence failure from resolving the page list. The
    /// connection itself comes up asynchronously; watch [`Self::status`].
    pub async fn connect(
        config: ClientConfig,
        api: Arc<dyn PersistenceApi>,
    ) -> Result<Self, ConnectError> {
        if config.user_id.is_empty() || config.user_name.is_empty() {
            return Err(ConnectError::IncompleteIdentity);
        }

        let store = Arc::new(ChangeStore::new());
        let pages = PageLifecycle::bootstrap(api.as_ref(), &store, config.whiteboard_id).await?;
        let current = current_page(&pages, config.page_id);
        info!(
            whiteboard_id = config.whiteboard_id,
            page_id = current,
            pages = pages.len(),
            "joining whiteboard"
        );

        let session = Session {
            whiteboard_id: config.whiteboard_id,
            page_id: current,
            user_id: config.user_id,
            user_name: config.user_name,
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::spawn(
            config.relay_url,
            session,
            store.clone(),
            api.clone(),
            events_tx,
        );
        let handle = manager.handle();
        let session_rx = manager.session_rx();

        let outbound = Outbound {
            handle: handle.clone(),
            api: api.clone(),
            session_rx: session_rx.clone(),
        }
        .spawn(store.subscribe());

        let lifecycle =
            PageLifecycle::new(config.whiteboard_id, store.clone(), api, handle.clone());
        let presence = PresenceBroadcaster::new(session_rx.clone());

        Ok(Self {
            store,
            pages: lifecycle,
            presence,
            manager,
            handle,
            session_rx,
            events_rx,
            outbound,
        })
    }

    /// The local change store. The editing surface applies user edits here
    /// (user origin) and renders from it.
    #[must_use]
    pub fn store(&self) -> Arc<ChangeStore> {
        self.store.clone()
    }

    /// Page this connection is currently scoped to.
    #[must_use]
    pub fn current_page_id(&self) -> i64 {
        self.session_rx.borrow().page_id
    }

    /// Live connection status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.handle.status()
    }

    /// Create a page on this whiteboard.
    ///
    /// # Errors
    ///
    /// Propagates the persistence failure; nothing changes locally.
    pub async fn create_page(&self, title: &str) -> Result<PageInfo, PageError> {
        self.pages.create_page(title).await
    }

    /// Rename a page (two-phase: optimistic local, rolled back on refusal).
    ///
    /// # Errors
    ///
    /// See [`PageLifecycle::rename_page`].
    pub async fn rename_page(&self, page_id: i64, title: &str) -> Result<(), PageError> {
        self.pages.rename_page(page_id, title).await
    }

    /// Delete a page. When the deleted page is the one currently viewed,
    /// the connection re-targets the replacement page.
    ///
    /// # Errors
    ///
    /// See [`PageLifecycle::delete_page`].
    pub async fn delete_page(&self, page_id: i64) -> Result<PageInfo, PageError> {
        let replacement = self.pages.delete_page(page_id).await?;
        if page_id == self.current_page_id() {
            self.manager.switch_page(replacement.page_id);
        }
        Ok(replacement)
    }

    /// Feed one pointer sample through the presence throttle. Samples inside
    /// the 50ms window are dropped; the rest broadcast to page peers.
    pub fn pointer_moved(&self, x: f64, y: f64, camera: Camera) {
        if let Some(message) = self.presence.pointer_sample(x, y, camera) {
            self.handle.send(message);
        }
    }

    /// Re-scope the connection to another page of the same whiteboard. The
    /// old connection sends `leave` and tears down first; edits made in the
    /// gap are dropped.
    pub fn switch_page(&self, page_id: i64) {
        self.manager.switch_page(page_id);
    }

    /// Next out-of-band engine event, or `None` after shutdown.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events_rx.recv().await
    }

    /// Leave the page and release the connection.
    pub async fn close(self) {
        self.manager.shutdown().await;
        self.outbound.abort();
    }
}

/// The configured page when it exists, else the first page by fractional
/// index.
fn current_page(pages: &[PageInfo], configured: Option<i64>) -> i64 {
    if let Some(wanted) = configured {
        if pages.iter().any(|page| page.page_id == wanted) {
            return wanted;
        }
    }
    pages
        .iter()
        .min_by(|a, b| format!("a{}", a.page_id).cmp(&format!("a{}", b.page_id)))
        .map_or(1, |page| page.page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(page_id: i64) -> PageInfo {
        PageInfo { page_id, page_title: format!("Page {page_id}") }
    }

    #[test]
    fn configured_page_wins_when_present() {
        let pages = vec![info(1), info(7)];
        assert_eq!(current_page(&pages, Some(7)), 7);
    }

    #[test]
    fn missing_configured_page_falls_back_to_first_by_index() {
        let pages = vec![info(5), info(2), info(9)];
        assert_eq!(current_page(&pages, Some(42)), 2);
        assert_eq!(current_page(&pages, None), 2);
    }

    #[test]
    fn empty_list_defaults_to_page_one() {
        assert_eq!(current_page(&[], None), 1);
    }
}
