//! WebSocket endpoint — page-scoped message relay.
//!
//! DESIGN
//! ======
//! On upgrade, the connection registers with its (whiteboard, page, drawer)
//! identity from the query string and enters a `select!` loop:
//! - Inbound client frames → decode once → fan out by scope
//! - Broadcast frames from peers → forward to the client
//!
//! A socket that drops without sending `leave` gets one synthesized on its
//! behalf, so peers can clear the stale presence record.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (identity required; 400 before upgrade otherwise)
//! 2. Join room → relay loop
//! 3. Close → synthesize `leave` if the client never sent one → part

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wire::WireMessage;

use crate::room;
use crate::state::{AppState, ClientHandle};

/// Frames buffered per client before the room starts dropping.
const CLIENT_QUEUE: usize = 256;

/// Connection identity, all required.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub whiteboard_id: i64,
    pub page_id: i64,
    pub drawer_id: String,
    pub user_name: String,
}

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if params.drawer_id.is_empty() || params.user_name.is_empty() {
        return (StatusCode::BAD_REQUEST, "drawerId and userName required").into_response();
    }
    ws.on_upgrade(move |socket| run_ws(socket, state, params))
}

async fn run_ws(mut socket: WebSocket, state: AppState, params: WsParams) {
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<WireMessage>(CLIENT_QUEUE);

    room::join(
        &state,
        params.whiteboard_id,
        client_id,
        ClientHandle { page_id: params.page_id, drawer_id: params.drawer_id.clone(), tx },
    )
    .await;

    let mut sent_leave = false;
    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else { break };
                match message {
                    Message::Text(text) => {
                        relay_text(&state, &params, client_id, text.as_str(), &mut sent_leave).await;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                if forward(&mut socket, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    // Peers on the page clear the presence record even when the socket died
    // without a goodbye.
    if !sent_leave {
        let leave = room::synthesized_leave(&params.drawer_id, params.page_id);
        room::broadcast(&state, params.whiteboard_id, &leave, Some(client_id)).await;
    }
    room::part(&state, params.whiteboard_id, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

/// Decode one inbound text frame and fan it out. Malformed frames are logged
/// and skipped; the connection stays up.
async fn relay_text(
    state: &AppState,
    params: &WsParams,
    client_id: Uuid,
    text: &str,
    sent_leave: &mut bool,
) {
    let message = match wire::decode_message(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(%client_id, %err, "ws: ignoring malformed frame");
            return;
        }
    };
    if matches!(message, WireMessage::Leave(_)) {
        *sent_leave = true;
    }
    debug!(%client_id, kind = message.kind(), "ws: relay frame");
    room::broadcast(state, params.whiteboard_id, &message, Some(client_id)).await;
}

async fn forward(socket: &mut WebSocket, message: &WireMessage) -> Result<(), ()> {
    let text = match wire::encode_message(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, kind = message.kind(), "ws: failed to encode frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}
