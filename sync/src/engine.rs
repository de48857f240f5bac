//! Sync engine — two-way translation between store batches and wire messages.
//!
//! DESIGN
//! ======
//! Outbound: user-origin store batches are partitioned down to shape and
//! binding records and relayed as one `sync` message per batch; a page record
//! whose name changed routes to the fire-and-forget rename rule instead.
//! Remote-origin batches never leave (the origin tag is the echo-loop
//! breaker, see `records`).
//!
//! Inbound: one decoded message at a time, dispatched by variant. A `sync`
//! message from the local user is discarded — it is the record of what was
//! already applied locally before sending — and a `sync` for another page is
//! discarded because shape synchronization is page-scoped. Everything that
//! survives the filters is applied as a single remote-origin batch.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use records::{ChangeBatch, ChangeOrigin, ChangeStore, Record, RecordId, RecordKind};
use wire::{PageInfo, PresenceMessage, SyncMessage, SyncPayload, WireMessage};

use crate::api::PersistenceApi;
use crate::color::color_for_user;
use crate::connection::RelayHandle;
use crate::session::{EngineEvent, Session};

// =============================================================================
// OUTBOUND
// =============================================================================

/// Task translating local store batches into outbound wire messages.
pub(crate) struct Outbound {
    pub handle: RelayHandle,
    pub api: Arc<dyn PersistenceApi>,
    pub session_rx: watch::Receiver<Session>,
}

impl Outbound {
    /// Consume store batches until the store side closes.
    pub(crate) fn spawn(self, mut batches: mpsc::UnboundedReceiver<ChangeBatch>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                self.process(&batch);
            }
        })
    }

    fn process(&self, batch: &ChangeBatch) {
        if batch.origin != ChangeOrigin::User {
            return;
        }
        let session = self.session_rx.borrow().clone();

        for (page_id, title) in page_renames(batch) {
            self.persist_rename(session.whiteboard_id, page_id, title);
        }

        let payload = relay_payload(batch);
        if payload.is_empty() {
            return;
        }
        self.handle.send(WireMessage::Sync(SyncMessage {
            user_id: Some(session.user_id),
            page_id: session.page_id,
            payload,
        }));
    }

    /// Persist a surface-originated page rename. Fire and forget: failures
    /// are logged, never retried, and nothing is rolled back on this path.
    fn persist_rename(&self, whiteboard_id: i64, page_id: i64, title: String) {
        let api = self.api.clone();
        tokio::spawn(async move {
            if let Err(err) = api.rename_page(whiteboard_id, page_id, &title).await {
                warn!(%err, page_id, "page rename persistence failed");
            }
        });
    }
}

/// The shape/binding slice of a batch, as a wire payload. Camera, instance
/// and other local bookkeeping records never relay.
pub(crate) fn relay_payload(batch: &ChangeBatch) -> SyncPayload {
    let mut payload = SyncPayload::default();
    for (id, record) in &batch.added {
        if is_relayed(id.kind()) {
            payload.added.insert(id.as_str().to_owned(), record.data.clone());
        }
    }
    for (id, update) in &batch.updated {
        if is_relayed(id.kind()) {
            payload.updated.insert(
                id.as_str().to_owned(),
                (update.from.data.clone(), update.to.data.clone()),
            );
        }
    }
    for (id, record) in &batch.removed {
        if is_relayed(id.kind()) {
            payload.removed.insert(id.as_str().to_owned(), record.data.clone());
        }
    }
    payload
}

fn is_relayed(kind: RecordKind) -> bool {
    matches!(kind, RecordKind::Shape | RecordKind::Binding)
}

/// Page records updated in this batch whose `name` actually changed.
pub(crate) fn page_renames(batch: &ChangeBatch) -> Vec<(i64, String)> {
    let mut renames = Vec::new();
    for (id, update) in &batch.updated {
        if id.kind() != RecordKind::Page {
            continue;
        }
        let Some(page_id) = id.page_number() else { continue };
        let Some(title) = update.to.name() else { continue };
        if update.from.name() != Some(title) {
            renames.push((page_id, title.to_owned()));
        }
    }
    renames
}

// =============================================================================
// INBOUND
// =============================================================================

/// Applier for decoded inbound messages, scoped to one live connection.
pub(crate) struct Inbound {
    pub store: Arc<ChangeStore>,
    pub session: Session,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

impl Inbound {
    /// Apply one decoded message to the local store.
    pub(crate) fn apply(&self, message: WireMessage) {
        match message {
            WireMessage::Sync(sync) => self.apply_sync(sync),
            WireMessage::NewPage(page) | WireMessage::UpdatePage(page) => {
                self.upsert_page(&page.page);
            }
            WireMessage::DeletePage(page) => self.delete_page(&page.page),
            WireMessage::Presence(presence) => self.upsert_presence(&presence),
            WireMessage::Leave(leave) => {
                debug!(drawer_id = %leave.drawer_id, "peer left page");
                self.store
                    .remove(RecordId::presence(&leave.drawer_id), ChangeOrigin::Remote);
            }
        }
    }

    /// Apply a record diff as one atomic remote batch. An absent sender id
    /// marks an authoritative bulk load and always applies.
    fn apply_sync(&self, sync: SyncMessage) {
        if sync.user_id.as_deref() == Some(self.session.user_id.as_str()) {
            return;
        }
        if sync.page_id != self.session.page_id {
            debug!(page_id = sync.page_id, "discarding sync for another page");
            return;
        }

        let mut put = Vec::new();
        for (id, data) in sync.payload.added {
            put.push(Record::new(RecordId::new(id), data));
        }
        for (id, (_from, to)) in sync.payload.updated {
            put.push(Record::new(RecordId::new(id), to));
        }
        // Orphaned shapes stay out of the store: a shape's page must exist
        // locally before the shape is materialized.
        put.retain(|record| match record.parent_page() {
            Some(parent) if record.kind() != RecordKind::Page => {
                let known = self.store.contains(&parent);
                if !known {
                    warn!(record = %record.id, parent = %parent, "skipping record with unknown parent page");
                }
                known
            }
            _ => true,
        });

        let remove: Vec<RecordId> = sync
            .payload
            .removed
            .into_keys()
            .map(RecordId::new)
            .collect();

        self.store.apply(put, remove, ChangeOrigin::Remote);
    }

    fn upsert_page(&self, page: &PageInfo) {
        self.store
            .put(Record::page(page.page_id, &page.page_title), ChangeOrigin::Remote);
    }

    /// Remove the page record and purge its shapes and bindings in one
    /// batch. When the deleted page is the one this connection is viewing,
    /// the embedder is told to prompt for a reload; the record removal
    /// happens regardless of what the user decides.
    fn delete_page(&self, page: &PageInfo) {
        let page_record = RecordId::page(page.page_id);
        let mut remove = vec![page_record.clone()];
        for kind in [RecordKind::Shape, RecordKind::Binding] {
            for record in self.store.records_of(kind) {
                if record.parent_page().as_ref() == Some(&page_record) {
                    remove.push(record.id);
                }
            }
        }
        self.store.apply(Vec::new(), remove, ChangeOrigin::Remote);

        if page.page_id == self.session.page_id {
            let _ = self.events.send(EngineEvent::PageDeleted { page_id: page.page_id });
        }
    }

    /// Materialize a peer's cursor/viewport. `currentPageId` is pinned to
    /// the local client's page so remote cursors render co-located; the wire
    /// page id only scoped the routing.
    fn upsert_presence(&self, presence: &PresenceMessage) {
        if presence.user_id == self.session.user_id {
            return;
        }
        let id = RecordId::presence(&presence.user_id);
        let record = Record::new(
            id,
            serde_json::json!({
                "id": format!("instance_presence:{}", presence.user_id),
                "userId": presence.user_id,
                "userName": presence.user_name,
                "color": color_for_user(&presence.user_id),
                "cursor": { "x": presence.x, "y": presence.y },
                "camera": {
                    "x": presence.camera.x,
                    "y": presence.camera.y,
                    "z": presence.camera.z,
                },
                "currentPageId": format!("page:{}", self.session.page_id),
            }),
        );
        self.store.put(record, ChangeOrigin::Remote);
    }
}
