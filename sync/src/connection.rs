//! Connection manager — owns the websocket lifecycle.
//!
//! DESIGN
//! ======
//! One supervisor task per client owns the socket end to end: connect with
//! identity in the query string, reload canonical page state, pump messages,
//! reconnect with bounded exponential backoff. Components never touch the
//! socket; they hold a [`RelayHandle`], and the handle refuses to queue
//! while the link is down, so a dead connection drops messages instead of
//! buffering stale state for later delivery.
//!
//! LIFECYCLE
//! =========
//! 1. Connect → clear + reload page shapes from persistence → Connected
//! 2. `select!` loop: outbound queue → socket; socket → decode → apply
//! 3. Page switch or shutdown → best-effort `leave` → teardown
//! 4. Transport error → Disconnected → backoff (1s doubling to 10s) → 1

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use records::{ChangeOrigin, ChangeStore, Record, RecordId, RecordKind};
use wire::{LeaveMessage, WireMessage};

use crate::api::PersistenceApi;
use crate::engine::Inbound;
use crate::session::{ConnectionStatus, EngineEvent, Session};

const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const MAX_BACKOFF: Duration = Duration::from_millis(10_000);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Cloneable sender for wire messages, gated on connection status.
///
/// This is the broadcast seam the sync engine and the page lifecycle are
/// given; nothing else in the crate can reach the socket.
#[derive(Clone)]
pub struct RelayHandle {
    out: mpsc::UnboundedSender<WireMessage>,
    status: watch::Receiver<ConnectionStatus>,
}

impl RelayHandle {
    /// Queue a message for the live connection. Returns `false` and drops
    /// the message while the link is down; dropped messages are never
    /// retried.
    pub fn send(&self, message: WireMessage) -> bool {
        if *self.status.borrow() != ConnectionStatus::Connected {
            debug!(kind = message.kind(), "dropping outbound message while disconnected");
            return false;
        }
        self.out.send(message).is_ok()
    }

    /// Live view of the connection status.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Owner of the supervisor task and its control channels.
pub(crate) struct ConnectionManager {
    handle: RelayHandle,
    session_tx: watch::Sender<Session>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Spawn the supervisor for a session. The connection comes up
    /// asynchronously; callers watch [`RelayHandle::status`] for the edge.
    pub(crate) fn spawn(
        relay_url: String,
        session: Session,
        store: Arc<ChangeStore>,
        api: Arc<dyn PersistenceApi>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (session_tx, session_rx) = watch::channel(session);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = RelayHandle { out: out_tx, status: status_rx };
        let supervisor = Supervisor {
            relay_url,
            store,
            api,
            events,
            out_rx,
            status_tx,
            session_rx,
            shutdown_rx,
        };
        let task = tokio::spawn(supervisor.run());

        Self { handle, session_tx, shutdown_tx, task }
    }

    pub(crate) fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    pub(crate) fn session_rx(&self) -> watch::Receiver<Session> {
        self.session_tx.subscribe()
    }

    /// Re-target the connection at another page. The supervisor sends
    /// `leave` for the old page, then reconnects scoped to the new one.
    pub(crate) fn switch_page(&self, page_id: i64) {
        self.session_tx.send_modify(|session| session.page_id = page_id);
    }

    /// Tear the connection down, sending a best-effort `leave` first.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// Why a live connection stopped pumping.
enum Exit {
    Shutdown,
    PageSwitch,
    Transport,
}

struct Supervisor {
    relay_url: String,
    store: Arc<ChangeStore>,
    api: Arc<dyn PersistenceApi>,
    events: mpsc::UnboundedSender<EngineEvent>,
    out_rx: mpsc::UnboundedReceiver<WireMessage>,
    status_tx: watch::Sender<ConnectionStatus>,
    session_rx: watch::Receiver<Session>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            let session = self.session_rx.borrow_and_update().clone();
            let url = session_url(&self.relay_url, &session);
            let _ = self.status_tx.send(ConnectionStatus::Connecting);

            let connected = tokio::select! {
                result = connect_async(url.as_str()) => result,
                _ = self.shutdown_rx.changed() => break,
            };
            let (ws, _) = match connected {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, page_id = session.page_id, "relay connect failed");
                    let _ = self.status_tx.send(ConnectionStatus::Disconnected);
                    if !self.sleep_backoff(&mut backoff).await {
                        break;
                    }
                    continue;
                }
            };
            backoff = INITIAL_BACKOFF;

            reload_page_state(&self.store, self.api.as_ref(), &session).await;
            drain_stale(&mut self.out_rx);
            let _ = self.status_tx.send(ConnectionStatus::Connected);
            info!(
                page_id = session.page_id,
                whiteboard_id = session.whiteboard_id,
                "relay connected"
            );

            let exit = self.pump(ws, &session).await;
            let _ = self.status_tx.send(ConnectionStatus::Disconnected);

            match exit {
                Exit::Shutdown => break,
                Exit::PageSwitch => {
                    info!(page_id = session.page_id, "leaving page");
                }
                Exit::Transport => {
                    if !self.sleep_backoff(&mut backoff).await {
                        break;
                    }
                }
            }
        }

        let _ = self.status_tx.send(ConnectionStatus::Disconnected);
    }

    /// Pump one live socket until it dies or the session moves on.
    async fn pump(&mut self, ws: WsStream, session: &Session) -> Exit {
        let (mut sink, mut source) = ws.split();
        let inbound = Inbound {
            store: self.store.clone(),
            session: session.clone(),
            events: self.events.clone(),
        };

        let exit = loop {
            tokio::select! {
                outgoing = self.out_rx.recv() => {
                    let Some(message) = outgoing else { break Exit::Shutdown };
                    if !forward(&mut sink, &message).await {
                        break Exit::Transport;
                    }
                }
                incoming = source.next() => {
                    match receive(&inbound, incoming) {
                        Ok(()) => {}
                        Err(exit) => break exit,
                    }
                }
                changed = self.session_rx.changed() => {
                    break if changed.is_ok() { Exit::PageSwitch } else { Exit::Shutdown };
                }
                _ = self.shutdown_rx.changed() => {
                    break Exit::Shutdown;
                }
            }
        };

        if matches!(exit, Exit::Shutdown | Exit::PageSwitch) {
            // Broadcasts queued just before the teardown (e.g. the page
            // lifecycle's delete_page) still belong to this connection.
            while let Ok(message) = self.out_rx.try_recv() {
                if !forward(&mut sink, &message).await {
                    break;
                }
            }
            send_leave(&mut sink, session).await;
        }
        let _ = sink.close().await;
        exit
    }

    /// Sleep the current backoff, doubling it up to the cap. Returns `false`
    /// on shutdown. A session change cuts the sleep short so the reconnect
    /// re-targets the new page immediately.
    async fn sleep_backoff(&mut self, backoff: &mut Duration) -> bool {
        let wait = *backoff;
        *backoff = next_backoff(*backoff);
        tokio::select! {
            () = tokio::time::sleep(wait) => true,
            _ = self.session_rx.changed() => true,
            _ = self.shutdown_rx.changed() => false,
        }
    }
}

/// Encode and send one outbound message. Returns `false` when the socket is
/// gone; encode failures only skip the message.
async fn forward(sink: &mut WsSink, message: &WireMessage) -> bool {
    match wire::encode_message(message) {
        Ok(text) => sink.send(Message::Text(text.into())).await.is_ok(),
        Err(err) => {
            warn!(%err, kind = message.kind(), "failed to encode outbound message");
            true
        }
    }
}

/// Apply one inbound socket item. Malformed frames are logged and skipped;
/// only transport-level failures end the connection.
fn receive(
    inbound: &Inbound,
    incoming: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Result<(), Exit> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            match wire::decode_message(text.as_str()) {
                Ok(message) => inbound.apply(message),
                Err(err) => warn!(%err, "ignoring malformed frame"),
            }
            Ok(())
        }
        Some(Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
            Ok(())
        }
        Some(Ok(Message::Close(_))) | None => Err(Exit::Transport),
        Some(Err(err)) => {
            warn!(%err, "websocket receive failed");
            Err(Exit::Transport)
        }
    }
}

/// Best-effort departure notice while the socket is still open.
async fn send_leave(sink: &mut WsSink, session: &Session) {
    let leave = WireMessage::Leave(LeaveMessage {
        drawer_id: session.user_id.clone(),
        page_id: session.page_id,
    });
    if let Ok(text) = wire::encode_message(&leave) {
        let _ = sink.send(Message::Text(text.into())).await;
    }
}

/// Drop shape and binding records, then mirror the page's persisted shapes
/// back in as one remote batch. Runs on every (re)connect so the local copy
/// restarts from canonical state instead of trusting what survived the gap.
async fn reload_page_state(store: &ChangeStore, api: &dyn PersistenceApi, session: &Session) {
    let mut stale: Vec<RecordId> = store
        .records_of(RecordKind::Shape)
        .into_iter()
        .chain(store.records_of(RecordKind::Binding))
        .map(|record| record.id)
        .collect();

    let mut put = Vec::new();
    match api.list_shapes(session.whiteboard_id, session.page_id).await {
        Ok(rows) => {
            for row in rows {
                match row.to_record() {
                    Some(record) => put.push(record),
                    None => warn!(shape = %row.id, "skipping unparsable persisted shape"),
                }
            }
        }
        Err(err) => {
            warn!(%err, page_id = session.page_id, "shape reload failed; relying on relayed state");
        }
    }

    let fresh: HashSet<RecordId> = put.iter().map(|record| record.id.clone()).collect();
    stale.retain(|id| !fresh.contains(id));
    put.push(cursor_chrome_record());

    store.apply(put, stale, ChangeOrigin::Remote);
}

/// Instance record telling the surface to hide the native cursor while
/// collaborative presence is rendered.
fn cursor_chrome_record() -> Record {
    Record::new(
        RecordId::new("instance:local"),
        serde_json::json!({
            "id": "instance:local",
            "hideNativeCursor": true,
        }),
    )
}

/// Throw away messages queued against a previous connection.
fn drain_stale(out_rx: &mut mpsc::UnboundedReceiver<WireMessage>) {
    while out_rx.try_recv().is_ok() {}
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Page-scoped connection URI with identity in the query string.
fn session_url(relay_url: &str, session: &Session) -> String {
    format!(
        "{}/ws?whiteboardId={}&pageId={}&drawerId={}&userName={}",
        relay_url.trim_end_matches('/'),
        session.whiteboard_id,
        session.page_id,
        encode_query(&session.user_id),
        encode_query(&session.user_name),
    )
}

/// Percent-encode a query value. Unreserved characters pass through.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte));
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn test_handle(
    status: ConnectionStatus,
) -> (
    RelayHandle,
    mpsc::UnboundedReceiver<WireMessage>,
    watch::Sender<ConnectionStatus>,
) {
    let (out, rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(status);
    (RelayHandle { out, status: status_rx }, rx, status_tx)
}
