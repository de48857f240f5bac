//! Room membership and message fan-out.
//!
//! DESIGN
//! ======
//! Shape diffs, presence and departures fan out only to connections scoped
//! to the same page; page lifecycle events fan out board-wide. The sender is
//! always excluded — clients already applied their own mutation before
//! sending. The relay routes on the envelope alone and never inspects a
//! payload.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

use wire::{LeaveMessage, WireMessage};

use crate::state::{AppState, BoardState, ClientHandle};

/// Fan-out domain of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Connections scoped to this page only.
    Page(i64),
    /// Every connection on the whiteboard.
    Board,
}

/// Routing scope of a message, read off the envelope. The page id carried in
/// the message is authoritative, not the sender's registration.
#[must_use]
pub fn scope_of(message: &WireMessage) -> Scope {
    match message {
        WireMessage::Sync(m) => Scope::Page(m.page_id),
        WireMessage::Presence(m) => Scope::Page(m.page_id),
        WireMessage::Leave(m) => Scope::Page(m.page_id),
        WireMessage::NewPage(_) | WireMessage::UpdatePage(_) | WireMessage::DeletePage(_) => {
            Scope::Board
        }
    }
}

/// Register a connection on its board.
pub async fn join(state: &AppState, whiteboard_id: i64, client_id: Uuid, handle: ClientHandle) {
    let mut boards = state.boards.write().await;
    let board = boards.entry(whiteboard_id).or_insert_with(BoardState::new);
    info!(
        whiteboard_id,
        %client_id,
        page_id = handle.page_id,
        drawer_id = %handle.drawer_id,
        clients = board.clients.len() + 1,
        "client joined"
    );
    board.clients.insert(client_id, handle);
}

/// Remove a connection. Boards with no clients and no persisted state are
/// evicted.
pub async fn part(state: &AppState, whiteboard_id: i64, client_id: Uuid) {
    let mut boards = state.boards.write().await;
    let Some(board) = boards.get_mut(&whiteboard_id) else {
        return;
    };
    board.clients.remove(&client_id);
    info!(whiteboard_id, %client_id, remaining = board.clients.len(), "client left");

    if board.clients.is_empty() && board.pages.is_empty() {
        boards.remove(&whiteboard_id);
    }
}

/// Fan a message out to the whiteboard, honoring the message's scope and
/// excluding the sender. Best-effort: a full client channel drops the frame.
pub async fn broadcast(
    state: &AppState,
    whiteboard_id: i64,
    message: &WireMessage,
    exclude: Option<Uuid>,
) {
    let scope = scope_of(message);
    let boards = state.boards.read().await;
    let Some(board) = boards.get(&whiteboard_id) else {
        return;
    };

    for (client_id, handle) in &board.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        if let Scope::Page(page_id) = scope {
            if handle.page_id != page_id {
                continue;
            }
        }
        if let Err(TrySendError::Full(_)) = handle.tx.try_send(message.clone()) {
            debug!(whiteboard_id, %client_id, kind = message.kind(), "dropping frame for slow client");
        }
    }
}

/// Departure notice the relay fabricates when a socket drops without one.
#[must_use]
pub fn synthesized_leave(drawer_id: &str, page_id: i64) -> WireMessage {
    WireMessage::Leave(LeaveMessage { drawer_id: drawer_id.to_owned(), page_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers::{attach_client, state_with_pages};
    use wire::{Camera, PageInfo, PageMessage, PresenceMessage, SyncMessage, SyncPayload};

    fn sync_on(page_id: i64) -> WireMessage {
        WireMessage::Sync(SyncMessage {
            user_id: Some("user-x".to_owned()),
            page_id,
            payload: SyncPayload::default(),
        })
    }

    fn presence_on(page_id: i64) -> WireMessage {
        WireMessage::Presence(PresenceMessage {
            user_id: "user-x".to_owned(),
            user_name: "Xan".to_owned(),
            page_id,
            whiteboard_id: 3,
            x: 0.0,
            y: 0.0,
            camera: Camera { x: 0.0, y: 0.0, z: 1.0 },
        })
    }

    fn page_event(page_id: i64) -> WireMessage {
        WireMessage::NewPage(PageMessage {
            page: PageInfo { page_id, page_title: "P".to_owned() },
        })
    }

    #[test]
    fn scope_follows_the_message_envelope() {
        assert_eq!(scope_of(&sync_on(7)), Scope::Page(7));
        assert_eq!(scope_of(&presence_on(9)), Scope::Page(9));
        assert_eq!(scope_of(&synthesized_leave("u", 7)), Scope::Page(7));
        assert_eq!(scope_of(&page_event(7)), Scope::Board);
    }

    #[tokio::test]
    async fn page_scoped_messages_skip_other_pages_and_the_sender() {
        let state = state_with_pages(3, &[(7, "A"), (8, "B")]).await;
        let sender = Uuid::new_v4();
        let peer_same_page = Uuid::new_v4();
        let peer_other_page = Uuid::new_v4();
        let mut sender_rx = attach_client(&state, 3, sender, 7, "user-x").await;
        let mut same_rx = attach_client(&state, 3, peer_same_page, 7, "user-y").await;
        let mut other_rx = attach_client(&state, 3, peer_other_page, 8, "user-z").await;

        broadcast(&state, 3, &sync_on(7), Some(sender)).await;

        assert!(same_rx.try_recv().is_ok());
        assert!(other_rx.try_recv().is_err(), "page 8 never sees page 7 shape diffs");
        assert!(sender_rx.try_recv().is_err(), "the sender is excluded");
    }

    #[tokio::test]
    async fn page_events_reach_every_page_except_the_sender() {
        let state = state_with_pages(3, &[(7, "A"), (8, "B")]).await;
        let sender = Uuid::new_v4();
        let peer = Uuid::new_v4();
        let mut sender_rx = attach_client(&state, 3, sender, 7, "user-x").await;
        let mut peer_rx = attach_client(&state, 3, peer, 8, "user-z").await;

        broadcast(&state, 3, &page_event(9), Some(sender)).await;

        assert!(peer_rx.try_recv().is_ok(), "page events are board-wide");
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_whiteboards_never_receive_anything() {
        let state = state_with_pages(3, &[(7, "A")]).await;
        let elsewhere = Uuid::new_v4();
        let mut rx = attach_client(&state, 4, elsewhere, 7, "user-q").await;

        broadcast(&state, 3, &page_event(9), None).await;
        broadcast(&state, 3, &sync_on(7), None).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn part_evicts_a_board_with_no_state_left() {
        let state = AppState::new();
        let client = Uuid::new_v4();
        let _rx = attach_client(&state, 5, client, 1, "user-x").await;

        part(&state, 5, client).await;
        assert!(!state.boards.read().await.contains_key(&5));
    }

    #[tokio::test]
    async fn part_keeps_a_board_with_persisted_pages() {
        let state = state_with_pages(3, &[(1, "Home")]).await;
        let client = Uuid::new_v4();
        let _rx = attach_client(&state, 3, client, 1, "user-x").await;

        part(&state, 3, client).await;
        assert!(state.boards.read().await.contains_key(&3));
    }
}
