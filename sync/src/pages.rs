//! Page lifecycle controller — structural page operations across three
//! systems.
//!
//! DESIGN
//! ======
//! Every mutation runs persistence → local store → broadcast, in that fixed
//! order, so nothing is announced to peers that the backend has not
//! confirmed. Rename is the one two-phase operation: the local title is
//! applied optimistically and rolled back if the backend refuses. The
//! whiteboard-level invariant — at least one page exists at all times — is
//! enforced here, before any network side effect.
//!
//! Local mirror writes use remote origin: the controller owns its own
//! persistence and broadcast, so its store mutations must not re-enter the
//! sync engine's outbound or rename paths.

#[cfg(test)]
#[path = "pages_test.rs"]
mod pages_test;

use std::sync::Arc;

use tracing::{info, warn};

use records::{ChangeOrigin, ChangeStore, Record, RecordId, RecordKind};
use wire::{PageInfo, PageMessage, WireMessage};

use crate::api::{ApiError, PersistenceApi};
use crate::connection::RelayHandle;

/// Errors surfaced by structural page operations.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// The last remaining page cannot be deleted.
    #[error("a whiteboard must keep at least one page")]
    LastPage,
    /// The page is not mirrored in the local store.
    #[error("page {0} not found")]
    NotFound(i64),
    /// The persistence call failed; local state was not advanced (or was
    /// rolled back) past the point of failure.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Orchestrates page create/rename/delete across the persistence API, the
/// local store, and the board-wide broadcast.
pub struct PageLifecycle {
    whiteboard_id: i64,
    store: Arc<ChangeStore>,
    api: Arc<dyn PersistenceApi>,
    handle: RelayHandle,
}

impl PageLifecycle {
    pub(crate) fn new(
        whiteboard_id: i64,
        store: Arc<ChangeStore>,
        api: Arc<dyn PersistenceApi>,
        handle: RelayHandle,
    ) -> Self {
        Self { whiteboard_id, store, api, handle }
    }

    /// Mirror the persisted page list into a store before any connection is
    /// open. An empty backend list bootstraps the initial page through
    /// persistence so the ≥ 1 invariant holds from the first connect.
    ///
    /// # Errors
    ///
    /// Returns the persistence failure; nothing is mirrored on error.
    pub async fn bootstrap(
        api: &dyn PersistenceApi,
        store: &ChangeStore,
        whiteboard_id: i64,
    ) -> Result<Vec<PageInfo>, PageError> {
        let mut pages = api.list_pages(whiteboard_id).await?;
        if pages.is_empty() {
            let created = api.create_page(whiteboard_id, "Page 1").await?;
            info!(page_id = created.page_id, "bootstrapped initial page");
            pages.push(created);
        }

        let records = pages
            .iter()
            .map(|page| Record::page(page.page_id, &page.page_title))
            .collect();
        store.apply(records, Vec::new(), ChangeOrigin::Remote);
        Ok(pages)
    }

    /// Create a page. The backend assigns the numeric id; only a confirmed
    /// creation reaches the store and the wire.
    ///
    /// # Errors
    ///
    /// Returns the persistence failure; no local or broadcast state changes.
    pub async fn create_page(&self, title: &str) -> Result<PageInfo, PageError> {
        let page = self.api.create_page(self.whiteboard_id, title).await?;
        self.store
            .put(Record::page(page.page_id, &page.page_title), ChangeOrigin::Remote);
        self.handle
            .send(WireMessage::NewPage(PageMessage { page: page.clone() }));
        info!(page_id = page.page_id, "page created");
        Ok(page)
    }

    /// Rename a page: propose locally, confirm remotely, revert on refusal.
    /// The broadcast only goes out after persistence confirms.
    ///
    /// # Errors
    ///
    /// [`PageError::NotFound`] when the page is not in the local store;
    /// otherwise the persistence failure, with the local title rolled back.
    pub async fn rename_page(&self, page_id: i64, title: &str) -> Result<(), PageError> {
        let id = RecordId::page(page_id);
        let previous = self.store.get(&id).ok_or(PageError::NotFound(page_id))?;

        let mut renamed = previous.clone();
        if let Some(body) = renamed.data.as_object_mut() {
            body.insert("name".to_owned(), serde_json::Value::String(title.to_owned()));
        }
        self.store.put(renamed, ChangeOrigin::Remote);

        if let Err(err) = self.api.rename_page(self.whiteboard_id, page_id, title).await {
            warn!(%err, page_id, "rename refused; rolling back local title");
            self.store.put(previous, ChangeOrigin::Remote);
            return Err(err.into());
        }

        self.handle.send(WireMessage::UpdatePage(PageMessage {
            page: PageInfo { page_id, page_title: title.to_owned() },
        }));
        Ok(())
    }

    /// Delete a page and return the replacement current page. Rejected
    /// before any side effect while the whiteboard holds a single page.
    ///
    /// # Errors
    ///
    /// [`PageError::LastPage`] for the final page, [`PageError::NotFound`]
    /// for an unmirrored one, or the persistence failure (in which case no
    /// local or broadcast state changes).
    pub async fn delete_page(&self, page_id: i64) -> Result<PageInfo, PageError> {
        let pages = self.local_pages();
        if pages.len() <= 1 {
            return Err(PageError::LastPage);
        }
        let id = RecordId::page(page_id);
        let deleted = pages
            .iter()
            .find(|page| page.id == id)
            .cloned()
            .ok_or(PageError::NotFound(page_id))?;

        self.api.delete_page(self.whiteboard_id, page_id).await?;

        let mut remove = vec![id.clone()];
        for kind in [RecordKind::Shape, RecordKind::Binding] {
            for record in self.store.records_of(kind) {
                if record.parent_page().as_ref() == Some(&id) {
                    remove.push(record.id);
                }
            }
        }
        self.store.apply(Vec::new(), remove, ChangeOrigin::Remote);

        let replacement = self.replacement_page();
        self.handle.send(WireMessage::DeletePage(PageMessage {
            page: PageInfo {
                page_id,
                page_title: deleted.name().unwrap_or_default().to_owned(),
            },
        }));
        info!(page_id, replacement = replacement.page_id, "page deleted");
        Ok(replacement)
    }

    /// First remaining page by fractional index. Falls back to synthesizing
    /// an empty default page record so the caller always has a current page.
    fn replacement_page(&self) -> PageInfo {
        if let Some(first) = self.local_pages().into_iter().next() {
            if let Some(page_id) = first.id.page_number() {
                return PageInfo {
                    page_id,
                    page_title: first.name().unwrap_or_default().to_owned(),
                };
            }
        }

        let fallback = Record::page(1, "Page 1");
        self.store.put(fallback, ChangeOrigin::Remote);
        PageInfo { page_id: 1, page_title: "Page 1".to_owned() }
    }

    /// Page records ordered by their fractional index. Indices embed the
    /// numeric id, so ties cannot occur.
    fn local_pages(&self) -> Vec<Record> {
        let mut pages = self.store.records_of(RecordKind::Page);
        pages.sort_by(|a, b| a.sort_index().cmp(&b.sort_index()));
        pages
    }
}
